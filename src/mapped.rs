use std::collections::BTreeMap;

use crate::expression::{Expression, Leaf};
use crate::map::{self, Error, Mapping, Slot};
use crate::op::{Op, OpElement};

/// Per-emission templates, keyed by the type key of the mapped object they
/// render (`"arrayn"`, `"scalar_dot"`, ...).
pub type Accessors = BTreeMap<String, String>;

/// Rewrites one macro occurrence, in its one-argument and two-argument
/// forms.
pub trait Morph {
    fn one(&self, i: &str) -> Result<String, Error>;
    fn two(&self, i: &str, j: &str) -> Result<String, Error>;
}

/// Replace every occurrence of `from` with `to`, resuming after the
/// replacement text.
pub fn find_and_replace(s: &mut String, from: &str, to: &str) {
    let mut pos = 0;
    while let Some(found) = s[pos..].find(from) {
        let found = pos + found;
        s.replace_range(found..found + from.len(), to);
        pos = found + to.len();
    }
}

/// Rewrite every `token{i}` / `token{i,j}` span through `morph`.
///
/// Scanning resumes after the replacement text, so a morph may emit text
/// containing the token without sending the rewriter into a loop; such
/// text is left for a later pass.
pub fn replace_macro(s: &mut String, token: &str, morph: &dyn Morph) -> Result<(), Error> {
    let mut pos = 0;
    while let Some(found) = s[pos..].find(token) {
        let found = pos + found;
        let open = found + token.len();
        if s.as_bytes().get(open) != Some(&b'{') {
            return Err(Error::MalformedTemplate {
                token: token.to_owned(),
                at: found,
            });
        }
        let close = s[open..]
            .find('}')
            .map(|p| open + p)
            .ok_or_else(|| Error::MalformedTemplate {
                token: token.to_owned(),
                at: found,
            })?;
        let inner = &s[open + 1..close];
        let rewritten = match inner.find(',') {
            Some(comma) => morph.two(&inner[..comma], &inner[comma + 1..])?,
            None => morph.one(inner)?,
        };
        s.replace_range(found..=close, &rewritten);
        pos = found + rewritten.len();
    }
    Ok(())
}

/// Back-reference from a mapped object into the tree it was built from.
/// The expression and the mapping themselves are threaded through
/// `process`/`evaluate` calls, which keeps the mapping free of cycles.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub root_idx: usize,
}

/// Syntactic role of a mapped object, with the per-role data its rewrite
/// hooks need.
#[derive(Debug, Clone)]
pub enum Variant {
    HostScalar,
    Placeholder,
    Array { ld: String, effdim: u32 },
    ScalarDot(NodeInfo),
    Gemv(NodeInfo),
    Gemm(NodeInfo),
    Vdiag(NodeInfo),
    MatrixDiag(NodeInfo),
    MatrixRow(NodeInfo),
    MatrixColumn(NodeInfo),
    ArrayAccess(NodeInfo),
    Repeat { info: NodeInfo, orientation: char },
    Outer(NodeInfo),
    Cast,
}

/// A named, typed descriptor bound to one `(node, slot)` position of a
/// mapping.
///
/// Code-emission passes hand it an accessor template; `process` rewrites
/// the template through the variant's pre-hook, the keyword table and the
/// variant's post-hook, yielding the device-source text for that position.
#[derive(Debug, Clone)]
pub struct MappedObject {
    type_key: &'static str,
    name: String,
    scalartype: String,
    keywords: BTreeMap<String, String>,
    variant: Variant,
}

impl MappedObject {
    fn with_name(scalartype: &str, name: String, type_key: &'static str, variant: Variant) -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert("#scalartype".to_owned(), scalartype.to_owned());
        keywords.insert("#name".to_owned(), name.clone());
        Self {
            type_key,
            name,
            scalartype: scalartype.to_owned(),
            keywords,
            variant,
        }
    }

    fn with_id(scalartype: &str, id: u32, type_key: &'static str, variant: Variant) -> Self {
        Self::with_name(scalartype, format!("obj{id}"), type_key, variant)
    }

    /// Record `keywords[key] = value` and hand the value back for the
    /// variant to keep, so the keyword table stays the single source of
    /// truth.
    fn register_attribute(keywords: &mut BTreeMap<String, String>, key: &str, value: String) -> String {
        keywords.insert(key.to_owned(), value.clone());
        value
    }

    /// Pass-by-value scalar.
    #[must_use]
    pub fn host_scalar(scalartype: &str, id: u32) -> Self {
        Self::with_id(scalartype, id, "host_scalar", Variant::HostScalar)
    }

    /// Loop index at the given level.
    #[must_use]
    pub fn placeholder(level: u32) -> Self {
        Self::with_name("int", format!("sforidx{level}"), "placeholder", Variant::Placeholder)
    }

    /// Buffered array; `type_key` is `"array1"`, `"arrayn"` or
    /// `"arraynn"`, the count of `n`s being the effective dimension.
    #[must_use]
    pub fn array(scalartype: &str, id: u32, type_key: &'static str) -> Self {
        let effdim = type_key.matches('n').count() as u32;
        let mut obj = Self::with_id(
            scalartype,
            id,
            type_key,
            Variant::Array {
                ld: String::new(),
                effdim,
            },
        );
        let name = obj.name.clone();
        Self::register_attribute(&mut obj.keywords, "#pointer", format!("{name}_pointer"));
        Self::register_attribute(&mut obj.keywords, "#start", format!("{name}_start"));
        if effdim > 0 {
            Self::register_attribute(&mut obj.keywords, "#stride", format!("{name}_stride"));
        }
        if effdim > 1 {
            let ld = Self::register_attribute(&mut obj.keywords, "#ld", format!("{name}_ld"));
            obj.variant = Variant::Array { ld, effdim };
        }
        obj
    }

    /// Scalar reduction (max, min, argmax, inner product, ...).
    #[must_use]
    pub fn scalar_dot(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "scalar_dot", Variant::ScalarDot(info))
    }

    /// Row- or column-wise reduction, matrix-vector product included.
    #[must_use]
    pub fn gemv(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "gemv", Variant::Gemv(info))
    }

    /// Matrix-matrix product.
    #[must_use]
    pub fn gemm(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "gemm", Variant::Gemm(info))
    }

    /// Vector promoted to the diagonal of a matrix.
    #[must_use]
    pub fn vdiag(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "vdiag", Variant::Vdiag(info))
    }

    /// Diagonal of a matrix, seen as a vector.
    #[must_use]
    pub fn matrix_diag(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "matrix_diag", Variant::MatrixDiag(info))
    }

    #[must_use]
    pub fn matrix_row(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "matrix_row", Variant::MatrixRow(info))
    }

    #[must_use]
    pub fn matrix_column(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "matrix_column", Variant::MatrixColumn(info))
    }

    /// Element access through a computed index.
    #[must_use]
    pub fn array_access(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "array_access", Variant::ArrayAccess(info))
    }

    /// Rectangular tiling. The orientation is inferred from the sub-shape
    /// pair of the tuple operand: `(>1, 1)` tiles columns, `(1, >1)` rows,
    /// anything else a full matrix.
    pub fn repeat(scalartype: &str, id: u32, info: NodeInfo, expr: &Expression) -> Result<Self, Error> {
        let tuple_root = rhs_subtree(expr, info.root_idx)?;
        let sub0 = map::tuple_extent(expr, tuple_root, 2)?;
        let sub1 = map::tuple_extent(expr, tuple_root, 3)?;
        let orientation = if sub0 > 1 && sub1 == 1 {
            'c'
        } else if sub0 == 1 && sub1 > 1 {
            'r'
        } else {
            'm'
        };
        Ok(Self::with_id(
            scalartype,
            id,
            "repeat",
            Variant::Repeat { info, orientation },
        ))
    }

    /// Outer product of two vectors.
    #[must_use]
    pub fn outer(scalartype: &str, id: u32, info: NodeInfo) -> Self {
        Self::with_id(scalartype, id, "outer", Variant::Outer(info))
    }

    /// Pure type coercion; the scalar type is the textual spelling of the
    /// cast target.
    #[must_use]
    pub fn cast(op: Op, id: u32) -> Self {
        Self::with_id(op.cast_target().as_str(), id, "cast", Variant::Cast)
    }

    #[must_use]
    pub fn type_key(&self) -> &'static str {
        self.type_key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scalartype(&self) -> &str {
        &self.scalartype
    }

    #[must_use]
    pub fn keywords(&self) -> &BTreeMap<String, String> {
        &self.keywords
    }

    #[must_use]
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// `'s'`/`'c'`/`'m'` for arrays, `None` otherwise.
    #[must_use]
    pub fn kind(&self) -> Option<char> {
        match self.variant {
            Variant::Array { effdim, .. } => Some(match effdim {
                0 => 's',
                1 => 'c',
                _ => 'm',
            }),
            _ => None,
        }
    }

    /// The node this object re-enters the tree at, for variants that do.
    #[must_use]
    pub fn node_info(&self) -> Option<&NodeInfo> {
        match &self.variant {
            Variant::ScalarDot(info)
            | Variant::Gemv(info)
            | Variant::Gemm(info)
            | Variant::Vdiag(info)
            | Variant::MatrixDiag(info)
            | Variant::MatrixRow(info)
            | Variant::MatrixColumn(info)
            | Variant::ArrayAccess(info)
            | Variant::Repeat { info, .. }
            | Variant::Outer(info) => Some(info),
            _ => None,
        }
    }

    /// Operator of the node this object stands for.
    #[must_use]
    pub fn root_op(&self, expr: &Expression) -> Option<OpElement> {
        self.node_info()
            .and_then(|info| expr.tree().get(info.root_idx))
            .map(|node| node.op)
    }

    /// Whether a reduction tracks indices rather than values.
    #[must_use]
    pub fn is_index_dot(&self, expr: &Expression) -> bool {
        self.root_op(expr).is_some_and(|op| op.op.is_index_dot())
    }

    /// Rewrite `input`: variant pre-hook, then literal replacement of
    /// every keyword, then variant post-hook.
    pub fn process(&self, input: &str, expr: &Expression, mapping: &Mapping) -> Result<String, Error> {
        let mut res = input.to_owned();
        self.preprocess(&mut res)?;
        for (key, value) in &self.keywords {
            find_and_replace(&mut res, key, value);
        }
        self.postprocess(&mut res, expr, mapping)?;
        Ok(res)
    }

    /// Render against an accessor dictionary: the template under this
    /// object's type key goes through `process`; with no template the
    /// object renders as its bare name.
    pub fn evaluate(
        &self,
        accessors: &Accessors,
        expr: &Expression,
        mapping: &Mapping,
    ) -> Result<String, Error> {
        match accessors.get(self.type_key) {
            Some(template) => self.process(template, expr, mapping),
            None => Ok(self.name.clone()),
        }
    }

    fn preprocess(&self, s: &mut String) -> Result<(), Error> {
        match &self.variant {
            Variant::HostScalar => {
                struct NameMorph;
                impl Morph for NameMorph {
                    fn one(&self, _: &str) -> Result<String, Error> {
                        Ok("#name".to_owned())
                    }
                    fn two(&self, _: &str, _: &str) -> Result<String, Error> {
                        Ok("#name".to_owned())
                    }
                }
                replace_macro(s, "$VALUE", &NameMorph)
            }
            Variant::Array { ld, .. } => {
                struct ValueMorph<'a> {
                    ld: &'a str,
                }
                impl Morph for ValueMorph<'_> {
                    fn one(&self, i: &str) -> Result<String, Error> {
                        Ok(format!("#pointer[{i}]"))
                    }
                    fn two(&self, i: &str, j: &str) -> Result<String, Error> {
                        Ok(format!("#pointer[({i}) +  ({j}) * {ld}]", ld = self.ld))
                    }
                }
                replace_macro(s, "$VALUE", &ValueMorph { ld })
            }
            _ => Ok(()),
        }
    }

    fn postprocess(&self, res: &mut String, expr: &Expression, mapping: &Mapping) -> Result<(), Error> {
        match &self.variant {
            Variant::Vdiag(info) => {
                let offset = map::evaluate(Slot::Rhs, &Accessors::new(), expr, info.root_idx, mapping)?;
                find_and_replace(res, "#diag_offset", &offset);
                let mut accessors = Accessors::new();
                accessors.insert("arrayn".to_owned(), res.clone());
                accessors.insert("host_scalar".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::MatrixDiag(info) => {
                let offset = map::evaluate(Slot::Rhs, &Accessors::new(), expr, info.root_idx, mapping)?;
                find_and_replace(res, "#diag_offset", &offset);
                let mut accessors = Accessors::new();
                accessors.insert("arraynn".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::ArrayAccess(info) => {
                let index = map::evaluate(Slot::Rhs, &Accessors::new(), expr, info.root_idx, mapping)?;
                find_and_replace(res, "#index", &index);
                let mut accessors = Accessors::new();
                accessors.insert("arrayn".to_owned(), res.clone());
                accessors.insert("arraynn".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::MatrixRow(info) => {
                let row = map::evaluate(Slot::Rhs, &Accessors::new(), expr, info.root_idx, mapping)?;
                find_and_replace(res, "#row", &row);
                let mut accessors = Accessors::new();
                accessors.insert("arraynn".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::MatrixColumn(info) => {
                let column = map::evaluate(Slot::Rhs, &Accessors::new(), expr, info.root_idx, mapping)?;
                find_and_replace(res, "#column", &column);
                let mut accessors = Accessors::new();
                accessors.insert("arraynn".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::Repeat { info, orientation } => {
                let tuple_root = rhs_subtree(expr, info.root_idx)?;
                for (idx, key) in ["#rep0", "#rep1", "#sub0", "#sub1"].into_iter().enumerate() {
                    let child = map::tuple_child(expr, tuple_root, idx, mapping)?;
                    find_and_replace(res, key, &child.process("#name", expr, mapping)?);
                }

                struct RepeatMorph {
                    orientation: char,
                }
                impl Morph for RepeatMorph {
                    fn one(&self, _: &str) -> Result<String, Error> {
                        Ok(String::new())
                    }
                    fn two(&self, i: &str, j: &str) -> Result<String, Error> {
                        Ok(match self.orientation {
                            'c' => format!("$VALUE{{{i}}}"),
                            'r' => format!("$VALUE{{{j}}}"),
                            _ => format!("$VALUE{{{i},{j}}}"),
                        })
                    }
                }
                replace_macro(
                    res,
                    "$VALUE",
                    &RepeatMorph {
                        orientation: *orientation,
                    },
                )?;
                let mut accessors = Accessors::new();
                accessors.insert("arrayn".to_owned(), res.clone());
                accessors.insert("arraynn".to_owned(), res.clone());
                *res = map::evaluate(Slot::Lhs, &accessors, expr, info.root_idx, mapping)?;
                Ok(())
            }
            Variant::Outer(info) => {
                struct OuterMorph<'a> {
                    slot: Slot,
                    root_idx: usize,
                    expr: &'a Expression,
                    mapping: &'a Mapping,
                }
                impl Morph for OuterMorph<'_> {
                    fn one(&self, i: &str) -> Result<String, Error> {
                        let mut accessors = Accessors::new();
                        accessors.insert("arrayn".to_owned(), format!("$VALUE{{{i}}}"));
                        accessors.insert("array1".to_owned(), "#namereg".to_owned());
                        map::evaluate(self.slot, &accessors, self.expr, self.root_idx, self.mapping)
                    }
                    fn two(&self, _: &str, _: &str) -> Result<String, Error> {
                        Ok(String::new())
                    }
                }
                replace_macro(
                    res,
                    "$LVALUE",
                    &OuterMorph {
                        slot: Slot::Lhs,
                        root_idx: info.root_idx,
                        expr,
                        mapping,
                    },
                )?;
                replace_macro(
                    res,
                    "$RVALUE",
                    &OuterMorph {
                        slot: Slot::Rhs,
                        root_idx: info.root_idx,
                        expr,
                        mapping,
                    },
                )
            }
            _ => Ok(()),
        }
    }
}

/// Composite RHS of the node at `root_idx`.
fn rhs_subtree(expr: &Expression, root_idx: usize) -> Result<usize, Error> {
    let node = expr
        .tree()
        .get(root_idx)
        .ok_or(Error::DanglingIndex { node: root_idx })?;
    match node.rhs {
        Leaf::Node(i) => Ok(i),
        _ => Err(Error::InvalidLeaf { node: root_idx }),
    }
}
