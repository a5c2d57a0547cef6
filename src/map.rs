use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::{error, fmt};

use crate::binder::SymbolicBinder;
use crate::expression::{Expression, Leaf};
use crate::mapped::{Accessors, MappedObject, NodeInfo};
use crate::op::{Fixity, Op, OpFamily};
use crate::types::Int;

/// Mapping and emission errors
#[derive(Debug, Clone)]
pub enum Error {
    MissingEntry { node: usize, slot: Slot },
    DanglingIndex { node: usize },
    UnexpectedOperator { node: usize },
    InvalidLeaf { node: usize },
    MalformedTemplate { token: String, at: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntry { node, slot } => {
                write!(f, "no mapped object at node {node}, slot {slot:?}")
            }
            Self::DanglingIndex { node } => {
                write!(f, "composite reference out of range at node {node}")
            }
            Self::UnexpectedOperator { node } => {
                write!(f, "operator at node {node} has no rendering")
            }
            Self::InvalidLeaf { node } => write!(f, "unexpected leaf at node {node}"),
            Self::MalformedTemplate { token, at } => {
                write!(f, "unmatched braces after `{token}` at byte {at}")
            }
        }
    }
}

impl error::Error for Error {}

/// Position of a mapped object relative to its node: one of the two
/// half-edges, or the node's own role within its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Slot {
    Lhs = 0,
    Parent = 1,
    Rhs = 2,
}

/// The complete symbolic mapping of one expression: an arena of mapped
/// objects keyed by `(node index, slot)`.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: BTreeMap<(usize, Slot), Arc<MappedObject>>,
}

impl Mapping {
    pub fn insert(&mut self, node: usize, slot: Slot, object: MappedObject) {
        self.entries.insert((node, slot), Arc::new(object));
    }

    /// Entry lookup; absence is an invariant violation, not an expected
    /// outcome.
    pub fn get(&self, node: usize, slot: Slot) -> Result<&Arc<MappedObject>, Error> {
        self.entries
            .get(&(node, slot))
            .ok_or(Error::MissingEntry { node, slot })
    }

    #[must_use]
    pub fn try_get(&self, node: usize, slot: Slot) -> Option<&Arc<MappedObject>> {
        self.entries.get(&(node, slot))
    }

    #[must_use]
    pub fn contains(&self, node: usize, slot: Slot) -> bool {
        self.entries.contains_key(&(node, slot))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, Slot), &Arc<MappedObject>)> {
        self.entries.iter()
    }
}

/// A visitor which receives callbacks for every `(node, slot)` position
/// while walking an expression tree.
pub trait TraversalVisitor {
    fn visit(&mut self, expr: &Expression, root_idx: usize, slot: Slot) -> Result<(), Error>;
}

/// Depth-first walk: LHS subtree, LHS, RHS subtree, RHS, then PARENT.
///
/// With `inspect` unset the walk does not descend below operators that
/// carry their own mapped object; their children belong to that object.
pub fn traverse(
    expr: &Expression,
    root_idx: usize,
    visitor: &mut dyn TraversalVisitor,
    inspect: bool,
) -> Result<(), Error> {
    let node = expr
        .tree()
        .get(root_idx)
        .ok_or(Error::DanglingIndex { node: root_idx })?;
    let recurse = inspect || !node.op.is_node_leaf();
    if recurse {
        if let Leaf::Node(i) = node.lhs {
            if i >= root_idx {
                return Err(Error::DanglingIndex { node: root_idx });
            }
            traverse(expr, i, visitor, inspect)?;
        }
        if !node.lhs.is_invalid() {
            visitor.visit(expr, root_idx, Slot::Lhs)?;
        }
        if let Leaf::Node(i) = node.rhs {
            if i >= root_idx {
                return Err(Error::DanglingIndex { node: root_idx });
            }
            traverse(expr, i, visitor, inspect)?;
        }
        if !node.rhs.is_invalid() {
            visitor.visit(expr, root_idx, Slot::Rhs)?;
        }
    }
    visitor.visit(expr, root_idx, Slot::Parent)
}

/// Populates a mapping from the `(node, slot)` triples the traversal
/// feeds it.
struct MapFunctor<'a> {
    binder: &'a mut SymbolicBinder,
    mapping: &'a mut Mapping,
}

impl MapFunctor<'_> {
    fn create(
        &mut self,
        root_idx: usize,
        leaf: &Leaf,
        is_assigned: bool,
    ) -> Result<MappedObject, Error> {
        match leaf {
            Leaf::Scalar(v) => Ok(MappedObject::host_scalar(
                v.dtype().as_str(),
                self.binder.get(),
            )),
            Leaf::Array(a) => {
                let id = self.binder.get_array(a, is_assigned);
                let type_key = if a.shape().max() == 1 {
                    "array1"
                } else if a.dim() == 1 {
                    "arrayn"
                } else {
                    "arraynn"
                };
                Ok(MappedObject::array(a.dtype().as_str(), id, type_key))
            }
            Leaf::ForIndex(f) => Ok(MappedObject::placeholder(f.level)),
            Leaf::Node(_) | Leaf::Invalid => Err(Error::InvalidLeaf { node: root_idx }),
        }
    }
}

impl TraversalVisitor for MapFunctor<'_> {
    fn visit(&mut self, expr: &Expression, root_idx: usize, slot: Slot) -> Result<(), Error> {
        let node = expr
            .tree()
            .get(root_idx)
            .ok_or(Error::DanglingIndex { node: root_idx })?;
        match slot {
            Slot::Lhs => {
                if !node.lhs.is_composite() && !node.lhs.is_invalid() {
                    let object = self.create(root_idx, &node.lhs, node.op.op.is_assignment())?;
                    self.mapping.insert(root_idx, Slot::Lhs, object);
                }
            }
            Slot::Rhs => {
                if !node.rhs.is_composite() && !node.rhs.is_invalid() {
                    let object = self.create(root_idx, &node.rhs, false)?;
                    self.mapping.insert(root_idx, Slot::Rhs, object);
                }
            }
            Slot::Parent => {
                let info = NodeInfo { root_idx };
                let scalartype = expr.dtype().as_str();
                let op = node.op;
                let object = if op.op == Op::Vdiag {
                    Some(MappedObject::vdiag(scalartype, self.binder.get(), info))
                } else if op.op == Op::MatrixDiag {
                    Some(MappedObject::matrix_diag(scalartype, self.binder.get(), info))
                } else if op.op == Op::MatrixRow {
                    Some(MappedObject::matrix_row(scalartype, self.binder.get(), info))
                } else if op.op == Op::MatrixColumn {
                    Some(MappedObject::matrix_column(scalartype, self.binder.get(), info))
                } else if op.op == Op::AccessIndex {
                    Some(MappedObject::array_access(scalartype, self.binder.get(), info))
                } else if op.is_scalar_dot() {
                    Some(MappedObject::scalar_dot(scalartype, self.binder.get(), info))
                } else if op.is_vector_dot() {
                    Some(MappedObject::gemv(scalartype, self.binder.get(), info))
                } else if op.family == OpFamily::Gemm {
                    Some(MappedObject::gemm(scalartype, self.binder.get(), info))
                } else if op.op == Op::Repeat {
                    Some(MappedObject::repeat(
                        scalartype,
                        self.binder.get(),
                        info,
                        expr,
                    )?)
                } else if op.op == Op::OuterProd {
                    Some(MappedObject::outer(scalartype, self.binder.get(), info))
                } else if op.op.is_cast() {
                    Some(MappedObject::cast(op.op, self.binder.get()))
                } else {
                    None
                };
                if let Some(object) = object {
                    self.mapping.insert(root_idx, Slot::Parent, object);
                }
            }
        }
        Ok(())
    }
}

/// Build the complete mapping for an expression. Ids are assigned in
/// visit order, so the same expression and binder state always produce
/// the same mapping.
pub fn map_expression(expr: &Expression, binder: &mut SymbolicBinder) -> Result<Mapping, Error> {
    let mut mapping = Mapping::default();
    let mut functor = MapFunctor {
        binder,
        mapping: &mut mapping,
    };
    traverse(expr, expr.root(), &mut functor, true)?;
    Ok(mapping)
}

/// Render the text standing at one slot of a node.
///
/// Composite leaves recurse into the referenced sub-root; terminals go
/// through their mapped object. An interior node without a PARENT entry
/// renders as operator text over its children.
pub fn evaluate(
    slot: Slot,
    accessors: &Accessors,
    expr: &Expression,
    root_idx: usize,
    mapping: &Mapping,
) -> Result<String, Error> {
    let node = expr
        .tree()
        .get(root_idx)
        .ok_or(Error::DanglingIndex { node: root_idx })?;
    match slot {
        Slot::Lhs => match node.lhs {
            Leaf::Node(i) => evaluate(Slot::Parent, accessors, expr, i, mapping),
            _ => mapping
                .get(root_idx, Slot::Lhs)?
                .evaluate(accessors, expr, mapping),
        },
        Slot::Rhs => match node.rhs {
            Leaf::Node(i) => evaluate(Slot::Parent, accessors, expr, i, mapping),
            _ => mapping
                .get(root_idx, Slot::Rhs)?
                .evaluate(accessors, expr, mapping),
        },
        Slot::Parent => {
            if let Some(object) = mapping.try_get(root_idx, Slot::Parent) {
                return object.evaluate(accessors, expr, mapping);
            }
            match node.op.op.fixity() {
                Some(Fixity::Transparent) => {
                    evaluate(Slot::Lhs, accessors, expr, root_idx, mapping)
                }
                Some(Fixity::Prefix(sym)) => {
                    let operand = evaluate(Slot::Lhs, accessors, expr, root_idx, mapping)?;
                    Ok(format!("{sym}({operand})"))
                }
                Some(Fixity::Function(sym)) => {
                    let lhs = evaluate(Slot::Lhs, accessors, expr, root_idx, mapping)?;
                    if node.rhs.is_invalid() {
                        Ok(format!("{sym}({lhs})"))
                    } else {
                        let rhs = evaluate(Slot::Rhs, accessors, expr, root_idx, mapping)?;
                        Ok(format!("{sym}({lhs}, {rhs})"))
                    }
                }
                Some(Fixity::Assignment(sym)) => {
                    let lhs = evaluate(Slot::Lhs, accessors, expr, root_idx, mapping)?;
                    let rhs = evaluate(Slot::Rhs, accessors, expr, root_idx, mapping)?;
                    Ok(format!("{lhs} {sym} {rhs}"))
                }
                Some(Fixity::Infix(sym)) => {
                    let lhs = evaluate(Slot::Lhs, accessors, expr, root_idx, mapping)?;
                    let rhs = evaluate(Slot::Rhs, accessors, expr, root_idx, mapping)?;
                    Ok(format!("({lhs} {sym} {rhs})"))
                }
                None => Err(Error::UnexpectedOperator { node: root_idx }),
            }
        }
    }
}

/// Stream one processed line per first-seen mapped object whose type key
/// has an accessor, walking from the given slot. `already_fetched` spans
/// one emission and keeps a name from being fetched twice.
pub fn process(
    stream: &mut String,
    slot: Slot,
    accessors: &Accessors,
    expr: &Expression,
    root_idx: usize,
    mapping: &Mapping,
    already_fetched: &mut BTreeSet<String>,
) -> Result<(), Error> {
    let node = expr
        .tree()
        .get(root_idx)
        .ok_or(Error::DanglingIndex { node: root_idx })?;
    match slot {
        Slot::Lhs => match node.lhs {
            Leaf::Node(i) => process_walk(stream, accessors, expr, i, mapping, already_fetched),
            Leaf::Invalid => Ok(()),
            _ => emit(stream, accessors, expr, root_idx, Slot::Lhs, mapping, already_fetched),
        },
        Slot::Rhs => match node.rhs {
            Leaf::Node(i) => process_walk(stream, accessors, expr, i, mapping, already_fetched),
            Leaf::Invalid => Ok(()),
            _ => emit(stream, accessors, expr, root_idx, Slot::Rhs, mapping, already_fetched),
        },
        Slot::Parent => process_walk(stream, accessors, expr, root_idx, mapping, already_fetched),
    }
}

fn process_walk(
    stream: &mut String,
    accessors: &Accessors,
    expr: &Expression,
    root_idx: usize,
    mapping: &Mapping,
    already_fetched: &mut BTreeSet<String>,
) -> Result<(), Error> {
    let node = expr
        .tree()
        .get(root_idx)
        .ok_or(Error::DanglingIndex { node: root_idx })?;
    if !node.op.is_node_leaf() {
        match node.lhs {
            Leaf::Node(i) => process_walk(stream, accessors, expr, i, mapping, already_fetched)?,
            Leaf::Invalid => {}
            _ => emit(stream, accessors, expr, root_idx, Slot::Lhs, mapping, already_fetched)?,
        }
        match node.rhs {
            Leaf::Node(i) => process_walk(stream, accessors, expr, i, mapping, already_fetched)?,
            Leaf::Invalid => {}
            _ => emit(stream, accessors, expr, root_idx, Slot::Rhs, mapping, already_fetched)?,
        }
    }
    emit(stream, accessors, expr, root_idx, Slot::Parent, mapping, already_fetched)
}

fn emit(
    stream: &mut String,
    accessors: &Accessors,
    expr: &Expression,
    root_idx: usize,
    slot: Slot,
    mapping: &Mapping,
    already_fetched: &mut BTreeSet<String>,
) -> Result<(), Error> {
    let Some(object) = mapping.try_get(root_idx, slot) else {
        return Ok(());
    };
    let Some(template) = accessors.get(object.type_key()) else {
        return Ok(());
    };
    if already_fetched.insert(object.name().to_owned()) {
        stream.push_str(&object.process(template, expr, mapping)?);
        stream.push('\n');
    }
    Ok(())
}

/// Mapped object of the `idx`-th element of a tuple chain rooted at
/// `root`.
pub fn tuple_child<'a>(
    expr: &Expression,
    root: usize,
    idx: usize,
    mapping: &'a Mapping,
) -> Result<&'a Arc<MappedObject>, Error> {
    let mut root = root;
    for _ in 0..idx {
        let node = expr
            .tree()
            .get(root)
            .ok_or(Error::DanglingIndex { node: root })?;
        match node.rhs {
            Leaf::Node(i) => root = i,
            _ => return mapping.get(root, Slot::Rhs),
        }
    }
    mapping.get(root, Slot::Lhs)
}

/// Integral value of the `idx`-th element of a tuple chain; tuple
/// operands are scalar extents.
pub fn tuple_extent(expr: &Expression, root: usize, idx: usize) -> Result<Int, Error> {
    let mut root = root;
    for _ in 0..idx {
        let node = expr
            .tree()
            .get(root)
            .ok_or(Error::DanglingIndex { node: root })?;
        match &node.rhs {
            Leaf::Node(i) => root = *i,
            Leaf::Scalar(v) => return Ok(v.as_int()),
            _ => return Err(Error::InvalidLeaf { node: root }),
        }
    }
    let node = expr
        .tree()
        .get(root)
        .ok_or(Error::DanglingIndex { node: root })?;
    match &node.lhs {
        Leaf::Scalar(v) => Ok(v.as_int()),
        _ => Err(Error::InvalidLeaf { node: root }),
    }
}
