use num_enum::TryFromPrimitive;

use crate::types::NumericType;

/// Coarse grouping of operators, used for fast dispatch before looking at
/// the exact tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum OpFamily {
    Invalid = 0,

    // BLAS1-type
    Unary,
    Binary,
    VectorDot,

    // BLAS2-type
    RowsDot,
    ColumnsDot,

    // BLAS3-type
    Gemm,
}

/// Exact operator tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Op {
    Invalid = 0,

    // unary operator
    Minus = 1,
    Negate = 2,

    // unary expression
    CastBool = 3,
    CastChar = 4,
    CastUchar = 5,
    CastShort = 6,
    CastUshort = 7,
    CastInt = 8,
    CastUint = 9,
    CastLong = 10,
    CastUlong = 11,
    CastHalf = 12,
    CastFloat = 13,
    CastDouble = 14,

    Abs = 15,
    Acos = 16,
    Asin = 17,
    Atan = 18,
    Ceil = 19,
    Cos = 20,
    Cosh = 21,
    Exp = 22,
    Fabs = 23,
    Floor = 24,
    Log = 25,
    Log10 = 26,
    Sin = 27,
    Sinh = 28,
    Sqrt = 29,
    Tan = 30,
    Tanh = 31,
    Trans = 32,

    // binary expression
    Assign = 33,
    InplaceAdd = 34,
    InplaceSub = 35,
    Add = 36,
    Sub = 37,
    Mult = 38,
    Div = 39,
    ElementArgFmax = 40,
    ElementArgFmin = 41,
    ElementArgMax = 42,
    ElementArgMin = 43,
    ElementProd = 44,
    ElementDiv = 45,
    ElementEq = 46,
    ElementNeq = 47,
    ElementGreater = 48,
    ElementGeq = 49,
    ElementLess = 50,
    ElementLeq = 51,
    ElementPow = 52,
    ElementFmax = 53,
    ElementFmin = 54,
    ElementMax = 55,
    ElementMin = 56,

    // products
    OuterProd = 57,
    GemmNn = 58,
    GemmTn = 59,
    GemmNt = 60,
    GemmTt = 61,

    // access modifiers
    MatrixDiag = 62,
    MatrixRow = 63,
    MatrixColumn = 64,
    Repeat = 65,
    Reshape = 66,
    Shift = 67,
    Vdiag = 68,
    AccessIndex = 69,

    Pair = 70,

    Fuse = 71,
    Sfor = 72,
}

impl Op {
    /// Whether the tag writes through its left-hand side.
    #[must_use]
    pub fn is_assignment(self) -> bool {
        matches!(self, Self::Assign | Self::InplaceAdd | Self::InplaceSub)
    }

    /// Whether the tag is one of the 12 type coercions.
    #[must_use]
    pub fn is_cast(self) -> bool {
        matches!(
            self,
            Self::CastBool
                | Self::CastChar
                | Self::CastUchar
                | Self::CastShort
                | Self::CastUshort
                | Self::CastInt
                | Self::CastUint
                | Self::CastLong
                | Self::CastUlong
                | Self::CastHalf
                | Self::CastFloat
                | Self::CastDouble
        )
    }

    /// Whether a reduction over this tag tracks the winning index rather
    /// than the winning value.
    #[must_use]
    pub fn is_index_dot(self) -> bool {
        matches!(
            self,
            Self::ElementArgFmax | Self::ElementArgMax | Self::ElementArgFmin | Self::ElementArgMin
        )
    }

    /// Target type of a cast tag, `Invalid` for every other tag.
    #[must_use]
    pub fn cast_target(self) -> NumericType {
        match self {
            Self::CastBool => NumericType::Bool,
            Self::CastChar => NumericType::Char,
            Self::CastUchar => NumericType::Uchar,
            Self::CastShort => NumericType::Short,
            Self::CastUshort => NumericType::Ushort,
            Self::CastInt => NumericType::Int,
            Self::CastUint => NumericType::Uint,
            Self::CastLong => NumericType::Long,
            Self::CastUlong => NumericType::Ulong,
            Self::CastHalf => NumericType::Half,
            Self::CastFloat => NumericType::Float,
            Self::CastDouble => NumericType::Double,
            _ => NumericType::Invalid,
        }
    }

    /// Source-text shape of the tag when an interior node is rendered
    /// without a mapped parent. `None` for tags that never render inline.
    #[must_use]
    pub fn fixity(self) -> Option<Fixity> {
        Some(match self {
            Self::Minus => Fixity::Prefix("-"),
            Self::Negate => Fixity::Prefix("!"),

            Self::Abs => Fixity::Function("abs"),
            Self::Acos => Fixity::Function("acos"),
            Self::Asin => Fixity::Function("asin"),
            Self::Atan => Fixity::Function("atan"),
            Self::Ceil => Fixity::Function("ceil"),
            Self::Cos => Fixity::Function("cos"),
            Self::Cosh => Fixity::Function("cosh"),
            Self::Exp => Fixity::Function("exp"),
            Self::Fabs => Fixity::Function("fabs"),
            Self::Floor => Fixity::Function("floor"),
            Self::Log => Fixity::Function("log"),
            Self::Log10 => Fixity::Function("log10"),
            Self::Sin => Fixity::Function("sin"),
            Self::Sinh => Fixity::Function("sinh"),
            Self::Sqrt => Fixity::Function("sqrt"),
            Self::Tan => Fixity::Function("tan"),
            Self::Tanh => Fixity::Function("tanh"),
            // transposition is an indexing concern; the text passes through
            Self::Trans => Fixity::Transparent,

            Self::Assign => Fixity::Assignment("="),
            Self::InplaceAdd => Fixity::Assignment("+="),
            Self::InplaceSub => Fixity::Assignment("-="),
            Self::Add => Fixity::Infix("+"),
            Self::Sub => Fixity::Infix("-"),
            Self::Mult | Self::ElementProd => Fixity::Infix("*"),
            Self::Div | Self::ElementDiv => Fixity::Infix("/"),
            Self::ElementEq => Fixity::Infix("=="),
            Self::ElementNeq => Fixity::Infix("!="),
            Self::ElementGreater => Fixity::Infix(">"),
            Self::ElementGeq => Fixity::Infix(">="),
            Self::ElementLess => Fixity::Infix("<"),
            Self::ElementLeq => Fixity::Infix("<="),
            Self::ElementPow => Fixity::Function("pow"),
            Self::ElementFmax => Fixity::Function("fmax"),
            Self::ElementFmin => Fixity::Function("fmin"),
            Self::ElementMax => Fixity::Function("max"),
            Self::ElementMin => Fixity::Function("min"),

            _ => return None,
        })
    }
}

/// How an operator spells itself in emitted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    /// `sym(operand)`
    Prefix(&'static str),
    /// `(lhs sym rhs)`
    Infix(&'static str),
    /// `lhs sym rhs`, never parenthesized
    Assignment(&'static str),
    /// `sym(lhs, rhs)` or `sym(operand)`
    Function(&'static str),
    /// renders as its operand
    Transparent,
}

/// The `(family, tag)` pair attached to every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpElement {
    pub family: OpFamily,
    pub op: Op,
}

impl OpElement {
    #[must_use]
    pub fn new(family: OpFamily, op: Op) -> Self {
        Self { family, op }
    }

    /// Reduction to a scalar.
    #[must_use]
    pub fn is_scalar_dot(self) -> bool {
        self.family == OpFamily::VectorDot
    }

    /// Row- or column-wise reduction.
    #[must_use]
    pub fn is_vector_dot(self) -> bool {
        matches!(self.family, OpFamily::RowsDot | OpFamily::ColumnsDot)
    }

    /// Operators whose node acquires its own mapped object; emission
    /// walks stop at them and let that object render its children.
    #[must_use]
    pub fn is_node_leaf(self) -> bool {
        matches!(
            self.family,
            OpFamily::VectorDot | OpFamily::RowsDot | OpFamily::ColumnsDot | OpFamily::Gemm
        ) || matches!(
            self.op,
            Op::MatrixDiag
                | Op::MatrixRow
                | Op::MatrixColumn
                | Op::Vdiag
                | Op::AccessIndex
                | Op::Repeat
                | Op::OuterProd
        ) || self.op.is_cast()
    }
}
