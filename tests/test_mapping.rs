use std::collections::BTreeSet;
use std::sync::Arc;

use symexpr::driver::{
    Backend, BackendKind, Buffer, CommandQueue, Context, Event, ExecutionOptions, Kernel, NDRange,
};
use symexpr::expression::{self, lhs_most};
use symexpr::map::{self, evaluate, map_expression, process, Slot};
use symexpr::{
    Accessors, ArrayBase, BindingPolicy, Expression, ForIndex, Leaf, NumericType, Op, OpElement,
    OpFamily, Operand, Shape, Slice, SymbolicBinder, Value,
};

fn ctx() -> Context {
    Context::new(BackendKind::OpenCl, 1)
}

fn array(shape: Shape) -> Arc<ArrayBase> {
    let size = shape.prod() as usize * NumericType::Float.size();
    let data = Buffer::from_native(ctx(), size, 0xd00d);
    Arc::new(ArrayBase::new(NumericType::Float, shape, ctx(), data))
}

fn scalar_array() -> Arc<ArrayBase> {
    array(Shape::of1(1))
}

fn vector(n: i64) -> Arc<ArrayBase> {
    array(Shape::of1(n))
}

fn matrix(m: i64, n: i64) -> Arc<ArrayBase> {
    array(Shape::of2(m, n))
}

fn binary(op: Op) -> OpElement {
    OpElement::new(OpFamily::Binary, op)
}

fn mapped(e: &Expression) -> symexpr::Mapping {
    let mut binder = SymbolicBinder::default();
    map_expression(e, &mut binder).unwrap()
}

#[test]
fn test_host_scalar_value_rewrite() {
    let e = Expression::new(
        Value::Float(4.2),
        Value::Float(0.5),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let lhs = mapping.get(0, Slot::Lhs).unwrap();
    assert_eq!(lhs.name(), "obj0");
    assert_eq!(lhs.type_key(), "host_scalar");
    assert_eq!(
        lhs.process("$VALUE{k} + $VALUE{k}", &e, &mapping).unwrap(),
        "obj0 + obj0"
    );
}

#[test]
fn test_array_2d_index_rewrite() {
    let a = matrix(16, 16);
    let e = Expression::new(
        &a,
        Value::Float(1.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of2(16, 16),
    )
    .unwrap();
    let mapping = mapped(&e);
    let lhs = mapping.get(0, Slot::Lhs).unwrap();
    assert_eq!(lhs.type_key(), "arraynn");
    assert_eq!(lhs.kind(), Some('m'));
    assert_eq!(
        lhs.process("$VALUE{i,j}", &e, &mapping).unwrap(),
        "obj0_pointer[(i) +  (j) * obj0_ld]"
    );
    assert_eq!(
        lhs.process("$VALUE{i}", &e, &mapping).unwrap(),
        "obj0_pointer[i]"
    );
}

#[test]
fn test_array_keyword_tables() {
    let cases = [
        (scalar_array(), "array1", 's', false, false),
        (vector(8), "arrayn", 'c', true, false),
        (matrix(8, 8), "arraynn", 'm', true, true),
    ];
    for (a, type_key, kind, has_stride, has_ld) in cases {
        let e = Expression::new(
            &a,
            Value::Float(0.0),
            binary(Op::Add),
            ctx(),
            NumericType::Float,
            a.shape().clone(),
        )
        .unwrap();
        let mapping = mapped(&e);
        let lhs = mapping.get(0, Slot::Lhs).unwrap();
        let name = lhs.name().to_owned();
        let keywords = lhs.keywords();
        assert_eq!(lhs.type_key(), type_key);
        assert_eq!(lhs.kind(), Some(kind));
        assert_eq!(keywords["#name"], name);
        assert_eq!(keywords["#scalartype"], "float");
        assert_eq!(keywords["#pointer"], format!("{name}_pointer"));
        assert_eq!(keywords["#start"], format!("{name}_start"));
        assert_eq!(keywords.contains_key("#stride"), has_stride);
        assert_eq!(keywords.contains_key("#ld"), has_ld);
    }
}

#[test]
fn test_matrix_row_postprocess() {
    let y = vector(16);
    let a = matrix(16, 16);
    let row = Expression::new(
        &a,
        Value::Int(3),
        binary(Op::MatrixRow),
        ctx(),
        NumericType::Float,
        Shape::of1(16),
    )
    .unwrap();
    let e = Expression::new(
        &y,
        row,
        binary(Op::Assign),
        ctx(),
        NumericType::Float,
        Shape::of1(16),
    )
    .unwrap();
    let mapping = mapped(&e);

    // the assigned output claims obj0, the viewed matrix comes after
    assert_eq!(mapping.get(1, Slot::Lhs).unwrap().name(), "obj0");
    assert_eq!(mapping.get(0, Slot::Lhs).unwrap().name(), "obj1");
    assert_eq!(mapping.get(0, Slot::Parent).unwrap().type_key(), "matrix_row");

    let mut accessors = Accessors::new();
    accessors.insert("matrix_row".to_owned(), "$VALUE{#row}".to_owned());
    let out = evaluate(Slot::Rhs, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj1_pointer[obj2]");
}

#[test]
fn test_matrix_column_postprocess() {
    let a = matrix(16, 16);
    let e = Expression::new(
        &a,
        Value::Int(2),
        binary(Op::MatrixColumn),
        ctx(),
        NumericType::Float,
        Shape::of1(16),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut accessors = Accessors::new();
    accessors.insert("matrix_column".to_owned(), "$VALUE{i,#column}".to_owned());
    let out = evaluate(Slot::Parent, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj0_pointer[(i) +  (obj1) * obj0_ld]");
}

#[test]
fn test_vdiag_postprocess() {
    let x = vector(8);
    let e = Expression::new(
        &x,
        Value::Int(1),
        binary(Op::Vdiag),
        ctx(),
        NumericType::Float,
        Shape::of2(8, 8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut accessors = Accessors::new();
    accessors.insert("vdiag".to_owned(), "$VALUE{i + #diag_offset}".to_owned());
    let out = evaluate(Slot::Parent, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj0_pointer[i + obj1]");
}

#[test]
fn test_array_access_with_placeholder() {
    let x = vector(8);
    let e = Expression::new(
        &x,
        ForIndex::new(0),
        binary(Op::AccessIndex),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let idx = mapping.get(0, Slot::Rhs).unwrap();
    assert_eq!(idx.name(), "sforidx0");
    assert_eq!(idx.type_key(), "placeholder");
    assert_eq!(idx.keywords()["#scalartype"], "int");

    let mut accessors = Accessors::new();
    accessors.insert("array_access".to_owned(), "$VALUE{#index}".to_owned());
    let out = evaluate(Slot::Parent, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj0_pointer[sforidx0]");
}

fn repeat_expr(sub0: i32, sub1: i32) -> Expression {
    let x = vector(4);
    let last = Expression::new(
        Value::Int(sub0),
        Value::Int(sub1),
        binary(Op::Pair),
        ctx(),
        NumericType::Int,
        Shape::of1(1),
    )
    .unwrap();
    let mid = Expression::new(
        Value::Int(1),
        last,
        binary(Op::Pair),
        ctx(),
        NumericType::Int,
        Shape::of1(1),
    )
    .unwrap();
    let tuple = Expression::new(
        Value::Int(2),
        mid,
        binary(Op::Pair),
        ctx(),
        NumericType::Int,
        Shape::of1(1),
    )
    .unwrap();
    Expression::new(
        &x,
        tuple,
        binary(Op::Repeat),
        ctx(),
        NumericType::Float,
        Shape::of2(4, 4),
    )
    .unwrap()
}

#[test]
fn test_repeat_orientation_inference() {
    // sub-shape (1, 4): row tiling, the column index survives
    let e = repeat_expr(1, 4);
    let mapping = mapped(&e);
    let rep = mapping.get(e.root(), Slot::Parent).unwrap();
    assert_eq!(rep.type_key(), "repeat");
    assert_eq!(
        rep.process("$VALUE{i,j}", &e, &mapping).unwrap(),
        "obj0_pointer[j]"
    );

    // sub-shape (4, 1): column tiling
    let e = repeat_expr(4, 1);
    let mapping = mapped(&e);
    let rep = mapping.get(e.root(), Slot::Parent).unwrap();
    assert_eq!(
        rep.process("$VALUE{i,j}", &e, &mapping).unwrap(),
        "obj0_pointer[i]"
    );
}

#[test]
fn test_repeat_tuple_keywords() {
    let e = repeat_expr(1, 4);
    let mapping = mapped(&e);
    let rep = mapping.get(e.root(), Slot::Parent).unwrap();
    // tuple children bind in chain order: rep0, rep1, sub0, sub1
    assert_eq!(rep.process("#rep0", &e, &mapping).unwrap(), "obj1");
    assert_eq!(rep.process("#sub1", &e, &mapping).unwrap(), "obj4");
}

#[test]
fn test_outer_postprocess() {
    let x = vector(4);
    let y = vector(8);
    let e = Expression::new(
        &x,
        &y,
        binary(Op::OuterProd),
        ctx(),
        NumericType::Float,
        Shape::of2(4, 8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut accessors = Accessors::new();
    accessors.insert("outer".to_owned(), "$LVALUE{i}*$RVALUE{j}".to_owned());
    let out = evaluate(Slot::Parent, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj0_pointer[i]*obj1_pointer[j]");
}

#[test]
fn test_outer_register_name_for_scalar_operand() {
    let s = scalar_array();
    let y = vector(8);
    let e = Expression::new(
        &s,
        &y,
        binary(Op::OuterProd),
        ctx(),
        NumericType::Float,
        Shape::of2(1, 8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut accessors = Accessors::new();
    accessors.insert("outer".to_owned(), "$LVALUE{i}*$RVALUE{j}".to_owned());
    let out = evaluate(Slot::Parent, &accessors, &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "obj0reg*obj1_pointer[j]");
}

#[test]
fn test_cast() {
    let x = vector(4);
    let e = Expression::new(
        &x,
        Operand::Invalid,
        OpElement::new(OpFamily::Unary, Op::CastFloat),
        ctx(),
        NumericType::Float,
        Shape::of1(4),
    )
    .unwrap();
    let mapping = mapped(&e);
    let cast = mapping.get(0, Slot::Parent).unwrap();
    assert_eq!(cast.type_key(), "cast");
    assert_eq!(cast.scalartype(), "float");
    assert_eq!(cast.keywords()["#scalartype"], "float");
}

fn gemv_expr(y: &Arc<ArrayBase>, a: &Arc<ArrayBase>, x: &Arc<ArrayBase>) -> Expression {
    let prod = Expression::new(
        a,
        x,
        OpElement::new(OpFamily::RowsDot, Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(16),
    )
    .unwrap();
    Expression::new(
        y,
        prod,
        binary(Op::Assign),
        ctx(),
        NumericType::Float,
        Shape::of1(16),
    )
    .unwrap()
}

#[test]
fn test_gemv_mapping_determinism() {
    let y = vector(16);
    let a = matrix(16, 16);
    let x = vector(16);

    let e1 = gemv_expr(&y, &a, &x);
    let e2 = gemv_expr(&y, &a, &x);
    let m1 = mapped(&e1);
    let m2 = mapped(&e2);

    assert_eq!(m1.len(), m2.len());
    for ((k1, o1), (k2, o2)) in m1.iter().zip(m2.iter()) {
        assert_eq!(k1, k2);
        assert_eq!(o1.name(), o2.name());
        assert_eq!(o1.type_key(), o2.type_key());
        assert_eq!(o1.keywords(), o2.keywords());
    }
    let empty = Accessors::new();
    assert_eq!(
        evaluate(Slot::Parent, &empty, &e1, e1.root(), &m1).unwrap(),
        evaluate(Slot::Parent, &empty, &e2, e2.root(), &m2).unwrap(),
    );
    assert_eq!(
        evaluate(Slot::Parent, &empty, &e1, e1.root(), &m1).unwrap(),
        "obj0 = obj3"
    );
    let gemv = m1.get(0, Slot::Parent).unwrap();
    assert_eq!(gemv.type_key(), "gemv");
    assert!(!gemv.is_index_dot(&e1));
}

#[test]
fn test_scalar_dot_and_index_dot() {
    let x = vector(16);
    let y = vector(16);
    let dot = Expression::new(
        &x,
        &y,
        OpElement::new(OpFamily::VectorDot, Op::ElementArgMax),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&dot);
    let parent = mapping.get(0, Slot::Parent).unwrap();
    assert_eq!(parent.type_key(), "scalar_dot");
    assert!(parent.is_index_dot(&dot));
}

#[test]
fn test_gemm_parent_entry() {
    let a = matrix(8, 8);
    let b = matrix(8, 8);
    let e = Expression::new(
        &a,
        &b,
        OpElement::new(OpFamily::Gemm, Op::GemmNn),
        ctx(),
        NumericType::Float,
        Shape::of2(8, 8),
    )
    .unwrap();
    let mapping = mapped(&e);
    assert_eq!(mapping.get(0, Slot::Parent).unwrap().type_key(), "gemm");
}

#[test]
fn test_evaluate_matches_process_on_accessor_hit() {
    let e = Expression::new(
        Value::Float(1.0),
        Value::Float(2.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let lhs = mapping.get(0, Slot::Lhs).unwrap();

    let mut accessors = Accessors::new();
    accessors.insert("host_scalar".to_owned(), "(#scalartype)($VALUE{0})".to_owned());
    assert_eq!(
        lhs.evaluate(&accessors, &e, &mapping).unwrap(),
        lhs.process("(#scalartype)($VALUE{0})", &e, &mapping).unwrap(),
    );
    assert_eq!(lhs.evaluate(&accessors, &e, &mapping).unwrap(), "(float)(obj0)");
    // no accessor for the type key: the bare name comes back
    assert_eq!(lhs.evaluate(&Accessors::new(), &e, &mapping).unwrap(), "obj0");
}

#[test]
fn test_rewriter_leaves_macro_free_text_alone() {
    let e = Expression::new(
        Value::Float(1.0),
        Value::Float(2.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let lhs = mapping.get(0, Slot::Lhs).unwrap();
    let text = "for (int k = 0; k < K; k++) acc += x[k];";
    assert_eq!(lhs.process(text, &e, &mapping).unwrap(), text);
}

#[test]
fn test_malformed_templates() {
    let e = Expression::new(
        Value::Float(1.0),
        Value::Float(2.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let lhs = mapping.get(0, Slot::Lhs).unwrap();
    for bad in ["$VALUE", "$VALUE{i", "$VALUE + 1"] {
        let err = lhs.process(bad, &e, &mapping).unwrap_err();
        assert!(matches!(err, map::Error::MalformedTemplate { .. }), "{bad}");
    }
}

#[test]
fn test_composite_references_point_down() {
    let y = vector(16);
    let a = matrix(16, 16);
    let x = vector(16);
    for e in [gemv_expr(&y, &a, &x), repeat_expr(1, 4)] {
        assert_eq!(e.root(), e.tree().len() - 1);
        for (i, node) in e.tree().iter().enumerate() {
            if let Leaf::Node(j) = node.lhs {
                assert!(j < i);
            }
            if let Leaf::Node(j) = node.rhs {
                assert!(j < i);
            }
        }
    }
}

#[test]
fn test_binder_identity_reuse() {
    let x = vector(8);
    let e = Expression::new(
        &x,
        &x,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let mapping = mapped(&e);
    assert_eq!(mapping.get(0, Slot::Lhs).unwrap().name(), "obj0");
    assert_eq!(mapping.get(0, Slot::Rhs).unwrap().name(), "obj0");
}

#[test]
fn test_binder_policies() {
    let x = vector(8);
    let mut sequential = SymbolicBinder::new(BindingPolicy::Sequential);
    assert_eq!(sequential.get_array(&x, false), 0);
    assert_eq!(sequential.get_array(&x, true), 0);

    let mut independent = SymbolicBinder::new(BindingPolicy::Independent);
    let first = independent.get_array(&x, false);
    let rebound = independent.get_array(&x, true);
    assert_ne!(first, rebound);
    // later reads follow the rebinding
    assert_eq!(independent.get_array(&x, false), rebound);
}

#[test]
fn test_process_stream_fetches_each_name_once() {
    let x = vector(8);
    let y = vector(8);
    let mut accessors = Accessors::new();
    accessors.insert(
        "arrayn".to_owned(),
        "#scalartype #name = #pointer[i];".to_owned(),
    );

    let e = Expression::new(
        &x,
        &y,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut stream = String::new();
    let mut fetched = BTreeSet::new();
    process(&mut stream, Slot::Parent, &accessors, &e, e.root(), &mapping, &mut fetched).unwrap();
    assert_eq!(
        stream,
        "float obj0 = obj0_pointer[i];\nfloat obj1 = obj1_pointer[i];\n"
    );

    let e = Expression::new(
        &x,
        &x,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let mut stream = String::new();
    let mut fetched = BTreeSet::new();
    process(&mut stream, Slot::Parent, &accessors, &e, e.root(), &mapping, &mut fetched).unwrap();
    assert_eq!(stream, "float obj0 = obj0_pointer[i];\n");
}

#[test]
fn test_elementwise_interior_rendering() {
    // dot(x + y) forces the dot's child through operator-text rendering
    let x = vector(8);
    let y = vector(8);
    let sum = Expression::new(
        &x,
        &y,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let e = Expression::new(
        sum,
        Operand::Invalid,
        OpElement::new(OpFamily::Unary, Op::Sqrt),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let mapping = mapped(&e);
    let out = evaluate(Slot::Parent, &Accessors::new(), &e, e.root(), &mapping).unwrap();
    assert_eq!(out, "sqrt((obj0 + obj1))");
}

#[test]
fn test_unexpected_operator_and_missing_entry() {
    let e = Expression::new(
        Value::Int(1),
        Value::Int(2),
        binary(Op::Pair),
        ctx(),
        NumericType::Int,
        Shape::of1(1),
    )
    .unwrap();
    let mapping = mapped(&e);
    let err = evaluate(Slot::Parent, &Accessors::new(), &e, e.root(), &mapping).unwrap_err();
    assert!(matches!(err, map::Error::UnexpectedOperator { node: 0 }));

    let err = mapping.get(7, Slot::Lhs).unwrap_err();
    assert!(matches!(
        err,
        map::Error::MissingEntry { node: 7, slot: Slot::Lhs }
    ));
}

#[test]
fn test_invalid_expressions() {
    let invalid = [
        // placeholder under a value-only operator
        Expression::new(
            ForIndex::new(0),
            ForIndex::new(1),
            binary(Op::ElementPow),
            ctx(),
            NumericType::Int,
            Shape::of1(1),
        ),
        // binary node missing its right operand
        Expression::new(
            Value::Int(1),
            Operand::Invalid,
            binary(Op::Add),
            ctx(),
            NumericType::Int,
            Shape::of1(1),
        ),
        // unary node carrying a right operand
        Expression::new(
            Value::Int(1),
            Value::Int(2),
            OpElement::new(OpFamily::Unary, Op::Sqrt),
            ctx(),
            NumericType::Int,
            Shape::of1(1),
        ),
        // missing left operand
        Expression::new(
            Operand::Invalid,
            Value::Int(2),
            binary(Op::Add),
            ctx(),
            NumericType::Int,
            Shape::of1(1),
        ),
    ];
    for e in invalid {
        assert!(matches!(
            e.unwrap_err(),
            expression::Error::InvalidExpression { .. }
        ));
    }
}

#[test]
fn test_unknown_operator_tag() {
    assert!(Op::try_from(8u8).is_ok());
    assert!(Op::try_from(200u8).is_err());
    let err = expression::Error::from(Op::try_from(200u8).unwrap_err());
    assert!(matches!(err, expression::Error::UnknownOperator(200)));
}

#[test]
fn test_derived_unary_operators() {
    let x = vector(8);
    let e = Expression::new(
        &x,
        Value::Float(1.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let neg = -e;
    let root = &neg.tree()[neg.root()];
    assert_eq!(root.op.op, Op::Minus);
    assert_eq!(root.op.family, OpFamily::Unary);
    assert!(root.lhs.is_composite());
    assert!(root.rhs.is_invalid());

    let mapping = mapped(&neg);
    let out = evaluate(Slot::Parent, &Accessors::new(), &neg, neg.root(), &mapping).unwrap();
    assert_eq!(out, "-((obj0 + obj1))");
}

#[test]
fn test_lhs_most_follows_left_spine() {
    let x = vector(8);
    let y = vector(8);
    let z = vector(8);
    let inner = Expression::new(
        &x,
        &y,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let e = Expression::new(
        inner,
        &z,
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of1(8),
    )
    .unwrap();
    let node = lhs_most(e.tree(), e.root());
    assert!(matches!(node.lhs, Leaf::Array(_)));
    assert_eq!(node.op.op, Op::Add);
}

#[test]
fn test_shape_and_slice() {
    let s = Shape::new(vec![3, 4, 5]);
    assert_eq!(s.prod(), 60);
    assert_eq!(s.max(), 5);
    assert_eq!(s.min(), 3);
    assert_eq!(s.front(), 3);
    assert_eq!(s.back(), 5);
    assert_eq!(s.to_string(), "3,4,5,");

    let wide = Shape::new(vec![1 << 20, 1 << 20, 1 << 20]);
    assert_eq!(wide.prod(), 1i64 << 60);

    assert_eq!(symexpr::types::ALL.size(7), 7);
    assert_eq!(Slice::new(2, 8, 2).size(10), 3);
    assert_eq!(Slice::new(0, -2, 1).size(10), 11);
}

#[test]
fn test_reshape_is_metadata_only() {
    let a = matrix(4, 4);
    let mut e = Expression::new(
        &a,
        Value::Float(0.0),
        binary(Op::Add),
        ctx(),
        NumericType::Float,
        Shape::of2(4, 4),
    )
    .unwrap();
    let nodes = e.tree().len();
    e.reshape(Shape::of1(16));
    assert_eq!(e.shape(), &Shape::of1(16));
    assert_eq!(e.tree().len(), nodes);
}

struct TestBackend;

impl Backend for TestBackend {
    fn alloc(&self, context: &Context, size: usize) -> Result<Buffer, symexpr::driver::Error> {
        Ok(Buffer::from_native(*context, size, 0xbeef))
    }

    fn import(&self, backend: BackendKind, native: u64) -> Context {
        Context::new(backend, native)
    }

    fn queue(&self, context: &Context, id: usize) -> Result<CommandQueue, symexpr::driver::Error> {
        Ok(CommandQueue::new(context.backend, id as u64))
    }

    fn enqueue(
        &self,
        queue: &CommandQueue,
        kernel: &Kernel,
        _global: NDRange,
        _local: NDRange,
        deps: &[Event],
    ) -> Event {
        Event::new(queue.backend, kernel.handle + deps.len() as u64)
    }
}

#[test]
fn test_execution_options_collect_events() {
    let backend = TestBackend;
    let mut opts = ExecutionOptions::with_queue_id(3);
    assert_eq!(
        opts.queue(&backend, &ctx()).unwrap(),
        CommandQueue::new(BackendKind::OpenCl, 3)
    );

    let kernel = Kernel::new(BackendKind::OpenCl, 7);
    let event = opts
        .enqueue(&backend, &ctx(), &kernel, NDRange::d1(64), NDRange::d1(8))
        .unwrap();
    assert_eq!(opts.events, vec![event]);

    let explicit = ExecutionOptions::with_queue(CommandQueue::new(BackendKind::Cuda, 9));
    assert_eq!(
        explicit.queue(&backend, &ctx()).unwrap(),
        CommandQueue::new(BackendKind::Cuda, 9)
    );
}

#[test]
fn test_for_index_builders() {
    let e = ForIndex::new(2).add_assign(Value::Int(1));
    let root = &e.tree()[e.root()];
    assert_eq!(root.op.op, Op::InplaceAdd);
    assert!(matches!(root.lhs, Leaf::ForIndex(ForIndex { level: 2 })));

    let mapping = mapped(&e);
    assert_eq!(mapping.get(0, Slot::Lhs).unwrap().name(), "sforidx2");
}
