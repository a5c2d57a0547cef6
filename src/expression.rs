use std::sync::Arc;
use std::{error, fmt};

use num_enum::TryFromPrimitiveError;

use crate::driver::{Buffer, Context};
use crate::op::{Op, OpElement, OpFamily};
use crate::types::{Int, NumericType, Shape, Value};

/// Expression construction errors
#[derive(Debug, Clone)]
pub enum Error {
    InvalidExpression { node: usize, op: Op },
    UnknownOperator(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidExpression { node, op } => {
                write!(f, "invalid operand combination for `{op:?}` at node {node}")
            }
            Self::UnknownOperator(tag) => write!(f, "unknown operator tag `{tag}`"),
        }
    }
}

impl error::Error for Error {}

impl From<TryFromPrimitiveError<Op>> for Error {
    fn from(err: TryFromPrimitiveError<Op>) -> Self {
        Self::UnknownOperator(err.number)
    }
}

/// A dense array handle: an opaque device allocation plus the view
/// metadata the generated kernels index it with.
///
/// Arrays are shared by `Arc`; the symbolic layer identifies a handle by
/// pointer so the same array reused across an expression keeps one name.
#[derive(Debug, Clone)]
pub struct ArrayBase {
    dtype: NumericType,
    shape: Shape,
    start: Int,
    stride: Shape,
    context: Context,
    data: Buffer,
}

impl ArrayBase {
    #[must_use]
    pub fn new(dtype: NumericType, shape: Shape, context: Context, data: Buffer) -> Self {
        let stride = Shape::new(vec![1; shape.len()]);
        Self {
            dtype,
            shape,
            start: 0,
            stride,
            context,
            data,
        }
    }

    /// Same allocation seen through an offset/stride view.
    #[must_use]
    pub fn with_view(mut self, start: Int, stride: Shape) -> Self {
        self.start = start;
        self.stride = stride;
        self
    }

    #[must_use]
    pub fn dtype(&self) -> NumericType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn start(&self) -> Int {
        self.start
    }

    #[must_use]
    pub fn stride(&self) -> &Shape {
        &self.stride
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn data(&self) -> &Buffer {
        &self.data
    }
}

/// Loop index placeholder, standing for the induction variable of an
/// unrolled device-side `for`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForIndex {
    pub level: u32,
}

impl ForIndex {
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self { level }
    }

    #[must_use]
    pub fn assign(self, rhs: Value) -> Expression {
        self.bound(Op::Assign, rhs)
    }

    #[must_use]
    pub fn assign_expr(self, rhs: Expression) -> Expression {
        let dtype = rhs.dtype();
        Expression::join(
            Operand::ForIndex(self),
            Operand::Expression(rhs),
            OpElement::new(OpFamily::Binary, Op::Assign),
            None,
            dtype,
            Shape::of1(1),
        )
    }

    #[must_use]
    pub fn add_assign(self, rhs: Value) -> Expression {
        self.bound(Op::InplaceAdd, rhs)
    }

    #[must_use]
    pub fn sub_assign(self, rhs: Value) -> Expression {
        self.bound(Op::InplaceSub, rhs)
    }

    #[must_use]
    pub fn mul_assign(self, rhs: Value) -> Expression {
        self.bound(Op::Mult, rhs)
    }

    #[must_use]
    pub fn div_assign(self, rhs: Value) -> Expression {
        self.bound(Op::Div, rhs)
    }

    fn bound(self, op: Op, rhs: Value) -> Expression {
        Expression::join(
            Operand::ForIndex(self),
            Operand::Scalar(rhs),
            OpElement::new(OpFamily::Binary, op),
            None,
            rhs.dtype(),
            Shape::of1(1),
        )
    }
}

/// One half-edge of a node: either a terminal (scalar, array, loop index)
/// or a reference to a lower node in the same tree.
#[derive(Debug, Clone)]
pub enum Leaf {
    Invalid,
    /// Sub-expression rooted at the given index.
    Node(usize),
    Scalar(Value),
    Array(Arc<ArrayBase>),
    ForIndex(ForIndex),
}

impl Leaf {
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Numeric type carried by the terminal, `Invalid` for composite and
    /// empty leaves.
    #[must_use]
    pub fn dtype(&self) -> NumericType {
        match self {
            Self::Invalid | Self::Node(_) => NumericType::Invalid,
            Self::Scalar(v) => v.dtype(),
            Self::Array(a) => a.dtype(),
            Self::ForIndex(_) => NumericType::Int,
        }
    }
}

/// One node of the flat expression tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub lhs: Leaf,
    pub op: OpElement,
    pub rhs: Leaf,
}

/// Operand accepted by the expression builders.
#[derive(Debug, Clone)]
pub enum Operand {
    Invalid,
    Scalar(Value),
    Array(Arc<ArrayBase>),
    Expression(Expression),
    ForIndex(ForIndex),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<Arc<ArrayBase>> for Operand {
    fn from(a: Arc<ArrayBase>) -> Self {
        Self::Array(a)
    }
}

impl From<&Arc<ArrayBase>> for Operand {
    fn from(a: &Arc<ArrayBase>) -> Self {
        Self::Array(Arc::clone(a))
    }
}

impl From<Expression> for Operand {
    fn from(e: Expression) -> Self {
        Self::Expression(e)
    }
}

impl From<ForIndex> for Operand {
    fn from(f: ForIndex) -> Self {
        Self::ForIndex(f)
    }
}

/// A flat, index-linked expression tree.
///
/// Nodes are appended children-first, so every composite leaf points at a
/// strictly smaller index and the root is always the last node written.
#[derive(Debug, Clone)]
pub struct Expression {
    tree: Vec<Node>,
    root: usize,
    context: Option<Context>,
    dtype: NumericType,
    shape: Shape,
}

impl Expression {
    /// Build a new tree from two operands and an operator, splicing
    /// operand sub-trees in front of the new root.
    pub fn new(
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
        op: OpElement,
        context: Context,
        dtype: NumericType,
        shape: Shape,
    ) -> Result<Self, Error> {
        let lhs = lhs.into();
        let rhs = rhs.into();
        validate(&lhs, &rhs, op)?;
        Ok(Self::join(lhs, rhs, op, Some(context), dtype, shape))
    }

    /// Infallible constructor used by the derived operators once the
    /// operand combination is known to be sound.
    fn join(
        lhs: Operand,
        rhs: Operand,
        op: OpElement,
        context: Option<Context>,
        dtype: NumericType,
        shape: Shape,
    ) -> Self {
        let mut tree = Vec::new();
        let lhs = splice(&mut tree, lhs);
        let rhs = splice(&mut tree, rhs);
        let root = tree.len();
        tree.push(Node { lhs, op, rhs });
        Self {
            tree,
            root,
            context,
            dtype,
            shape,
        }
    }

    #[must_use]
    pub fn tree(&self) -> &[Node] {
        &self.tree
    }

    #[must_use]
    pub fn root(&self) -> usize {
        self.root
    }

    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    #[must_use]
    pub fn dtype(&self) -> NumericType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    /// Reinterpret the result extents. Metadata only; the tree is
    /// untouched.
    pub fn reshape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    fn unary(self, op: Op) -> Self {
        let context = self.context;
        let dtype = self.dtype;
        let shape = self.shape.clone();
        Self::join(
            Operand::Expression(self),
            Operand::Invalid,
            OpElement::new(OpFamily::Unary, op),
            context,
            dtype,
            shape,
        )
    }
}

impl std::ops::Neg for Expression {
    type Output = Expression;
    fn neg(self) -> Expression {
        self.unary(Op::Minus)
    }
}

impl std::ops::Not for Expression {
    type Output = Expression;
    fn not(self) -> Expression {
        self.unary(Op::Negate)
    }
}

/// Append an operand to `tree`, rebasing the composite indices of a
/// spliced sub-tree into the combined index space.
fn splice(tree: &mut Vec<Node>, operand: Operand) -> Leaf {
    match operand {
        Operand::Invalid => Leaf::Invalid,
        Operand::Scalar(v) => Leaf::Scalar(v),
        Operand::Array(a) => Leaf::Array(a),
        Operand::ForIndex(f) => Leaf::ForIndex(f),
        Operand::Expression(e) => {
            let offset = tree.len();
            for node in e.tree {
                tree.push(Node {
                    lhs: rebase(node.lhs, offset),
                    op: node.op,
                    rhs: rebase(node.rhs, offset),
                });
            }
            Leaf::Node(offset + e.root)
        }
    }
}

fn rebase(leaf: Leaf, offset: usize) -> Leaf {
    match leaf {
        Leaf::Node(i) => Leaf::Node(i + offset),
        other => other,
    }
}

fn validate(lhs: &Operand, rhs: &Operand, op: OpElement) -> Result<(), Error> {
    // the index the offending root would occupy
    let node = operand_len(lhs) + operand_len(rhs);
    let invalid = Error::InvalidExpression { node, op: op.op };

    if op.op == Op::Invalid || op.family == OpFamily::Invalid {
        return Err(invalid);
    }
    if matches!(lhs, Operand::Invalid) {
        return Err(invalid);
    }
    match op.family {
        OpFamily::Unary => {
            if !matches!(rhs, Operand::Invalid) {
                return Err(invalid);
            }
        }
        _ => {
            if matches!(rhs, Operand::Invalid) {
                return Err(invalid);
            }
        }
    }
    let placeholder = |o: &Operand| matches!(o, Operand::ForIndex(_));
    if (placeholder(lhs) || placeholder(rhs)) && !placeholder_op(op.op) {
        return Err(invalid);
    }
    Ok(())
}

/// Operators a loop-index placeholder may appear under: assignments on the
/// index itself, arithmetic in bounds and offsets, and indexed access.
fn placeholder_op(op: Op) -> bool {
    op.is_assignment()
        || matches!(
            op,
            Op::Add | Op::Sub | Op::Mult | Op::Div | Op::AccessIndex | Op::Sfor | Op::Pair
        )
}

fn operand_len(operand: &Operand) -> usize {
    match operand {
        Operand::Expression(e) => e.tree.len(),
        _ => 0,
    }
}

/// Follow the left spine down to the first non-composite node.
#[must_use]
pub fn lhs_most(tree: &[Node], root: usize) -> &Node {
    let mut node = &tree[root];
    while let Leaf::Node(i) = node.lhs {
        node = &tree[i];
    }
    node
}
