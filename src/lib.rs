//! Symbolic array expressions and kernel mapping for GPU code generation
//!
//! Expression trees built from BLAS-style array operations are flattened
//! into an index-linked node vector; a traversal then binds every
//! `(node, slot)` position to a named, keyword-carrying mapped object,
//! and code-generation templates render those objects into device source
//! through a small `$VALUE{...}` macro rewriter.

/// Symbolic id allocation
pub mod binder;
/// Opaque driver handles and launch options
pub mod driver;
/// Expression tree and builders
pub mod expression;
/// Traversal, mapping and recursive evaluation
pub mod map;
/// Mapped objects and the template rewriter
pub mod mapped;
/// Operator tags and classification
pub mod op;
/// Shapes, slices, numeric types and scalar values
pub mod types;

pub use self::binder::{BindingPolicy, SymbolicBinder};
pub use self::expression::{ArrayBase, Expression, ForIndex, Leaf, Node, Operand};
pub use self::map::{evaluate, map_expression, process, traverse, Mapping, Slot};
pub use self::mapped::{Accessors, MappedObject};
pub use self::op::{Op, OpElement, OpFamily};
pub use self::types::{NumericType, Shape, Slice, Value};
