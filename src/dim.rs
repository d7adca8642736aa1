//! Symbolic expressions representing the size of a tensor dimension.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::errors::DimError;
use crate::expr::ExprRef;
use crate::shape::Shape;
use crate::value_range::ValueRange;
use crate::var::DimVar;

/// Operand list of an n-ary dimension expression.
pub type DimList = SmallVec<[Dimension; 4]>;

/// Coarse classification of a [`Dimension`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DimKind {
    /// The dimension has a known integer value.
    Fixed,
    /// The dimension is a symbolic expression.
    Dynamic,
    /// Nothing is known about the dimension.
    Unknown,
}

/// Rounding mode of a division.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DivMode {
    /// Round towards negative infinity.
    Floor,
    /// Round towards positive infinity.
    Ceil,
}

/// Size of a tensor dimension.
///
/// A dimension is either a known integer, a symbolic expression involving
/// free variables, or unknown. Unknown dimensions are used as placeholders in
/// shape patterns and for inference results that could not be determined.
/// All unknown dimensions compare equal to each other.
///
/// Arithmetic operators fold constants and identities eagerly, but otherwise
/// just build expression nodes. Use [`simplify`](Dimension::simplify) to put
/// an expression into canonical form.
///
/// ```
/// use rten_dims::{Dimension, VarScope};
///
/// let scope = VarScope::new();
/// let batch = scope.dim_var("batch");
///
/// assert_eq!(Dimension::from(4) * Dimension::from(3), Dimension::from(12));
/// assert_eq!(&batch * &Dimension::from(1), batch);
///
/// let expr = &batch * &Dimension::from(3);
/// assert_eq!(expr.to_string(), "(batch * 3)");
/// assert!(expr.is_dynamic());
/// ```
#[derive(Clone)]
pub enum Dimension {
    /// Dimension with a known value.
    Fixed(i64),
    /// Symbolic expression.
    Dynamic(DynDim),
    /// Placeholder for a dimension about which nothing is known.
    Unknown,
}

/// A symbolic dimension expression together with its inferred range.
///
/// Nodes are immutable and cheap to clone. Sub-expressions may be shared
/// between several parent expressions.
#[derive(Clone)]
pub struct DynDim(Arc<DimNode>);

struct DimNode {
    expr: DimExpr,
    range: ValueRange,
}

impl DynDim {
    pub fn new(expr: DimExpr) -> Self {
        let range = expr.infer_range();
        DynDim(Arc::new(DimNode { expr, range }))
    }

    pub fn expr(&self) -> &DimExpr {
        &self.0.expr
    }

    /// Range of values this expression may take.
    pub fn range(&self) -> ValueRange {
        self.0.range
    }

    /// Address of the shared node, used when operands are keyed by identity.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &DynDim) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Composite dimension expression.
///
/// Build nodes directly via `Dimension::from(DimExpr::...)` to get an
/// expression exactly as written, or via the operators on [`Dimension`] to
/// get constant folding.
#[derive(Clone)]
pub enum DimExpr {
    /// Free variable.
    Var(DimVar),
    /// `scale * operands[0] * operands[1] * ...`
    Product { operands: DimList, scale: i64 },
    /// `bias + operands[0] + operands[1] + ...`
    Sum { operands: DimList, bias: i64 },
    /// Division rounded according to `mode`.
    Fraction {
        numerator: Dimension,
        denominator: Dimension,
        mode: DivMode,
    },
    /// Flooring remainder, with the sign of the denominator.
    Remainder {
        numerator: Dimension,
        denominator: Dimension,
    },
    /// `base` raised to a non-negative integer power.
    Power { base: Dimension, power: u32 },
    /// Absolute value.
    Abs(Dimension),
    /// `min(max(operand, min), max)`
    Clamp {
        operand: Dimension,
        min: Dimension,
        max: Dimension,
    },
    /// `true_value` if `value == expected`, otherwise `false_value`.
    CompareAndSelect {
        value: Dimension,
        expected: Dimension,
        true_value: Dimension,
        false_value: Dimension,
    },
    /// Minimum of the operands.
    Min(DimList),
    /// Maximum of the operands.
    Max(DimList),
    /// Normalize a possibly negative `index` into `[0, extent)`.
    ///
    /// Negative indices count back from `extent`. The result is clamped to
    /// the valid range.
    Positive { index: Dimension, extent: Dimension },
    /// The `index`'th dimension of `shape`.
    At { shape: Shape, index: Dimension },
    /// Scalar value of an expression from the operator IR.
    Expr(ExprRef),
}

impl DimExpr {
    /// Compute the range of this expression from the ranges of its operands.
    fn infer_range(&self) -> ValueRange {
        match self {
            Self::Var(var) => var.range(),
            Self::Product { operands, scale } => operands
                .iter()
                .fold(ValueRange::point(*scale), |acc, op| acc.mul(&op.range())),
            Self::Sum { operands, bias } => operands
                .iter()
                .fold(ValueRange::point(*bias), |acc, op| acc.add(&op.range())),
            Self::Fraction {
                numerator,
                denominator,
                mode,
            } => numerator.range().div(&denominator.range(), *mode),
            Self::Remainder {
                numerator,
                denominator,
            } => numerator.range().rem(&denominator.range()),
            Self::Power { base, power } => base.range().pow(*power),
            Self::Abs(operand) => operand.range().abs(),
            Self::Clamp { operand, min, max } => operand.range().clamp(&min.range(), &max.range()),
            Self::CompareAndSelect {
                true_value,
                false_value,
                ..
            } => true_value.range().union(&false_value.range()),
            Self::Min(operands) => fold_ranges(operands, ValueRange::min_with),
            Self::Max(operands) => fold_ranges(operands, ValueRange::max_with),
            Self::Positive { index, extent } => {
                let index = index.range();
                let mut max = (extent.range().max() - 1.).max(0.);
                if index.is_non_negative() {
                    max = max.min(index.max());
                }
                ValueRange::new(0., max)
            }
            Self::At { shape, .. } => shape_dims_range(shape),
            Self::Expr(expr) => expr.get().value_range().unwrap_or_default(),
        }
    }

    /// Rank used to order expressions of different types.
    fn variant_rank(&self) -> u8 {
        match self {
            Self::Var(_) => 0,
            Self::Product { .. } => 1,
            Self::Sum { .. } => 2,
            Self::Fraction { .. } => 3,
            Self::Remainder { .. } => 4,
            Self::Power { .. } => 5,
            Self::Abs(_) => 6,
            Self::Clamp { .. } => 7,
            Self::CompareAndSelect { .. } => 8,
            Self::Min(_) => 9,
            Self::Max(_) => 10,
            Self::Positive { .. } => 11,
            Self::At { .. } => 12,
            Self::Expr(_) => 13,
        }
    }
}

fn fold_ranges(operands: &[Dimension], op: fn(&ValueRange, &ValueRange) -> ValueRange) -> ValueRange {
    let mut ranges = operands.iter().map(|d| d.range());
    let Some(first) = ranges.next() else {
        return ValueRange::full();
    };
    ranges.fold(first, |acc, r| op(&acc, &r))
}

/// Range covering every dimension of a shape, if its dimensions are known.
fn shape_dims_range(shape: &Shape) -> ValueRange {
    match shape.known_dims() {
        Some(dims) if !dims.is_empty() => fold_ranges(&dims, |a, b| a.union(b)),
        _ => ValueRange::full(),
    }
}

impl Dimension {
    /// Create a dimension consisting of the variable `var`.
    pub fn var(var: DimVar) -> Dimension {
        DimExpr::Var(var).into()
    }

    /// Create a dimension from the scalar value of an operator IR expression.
    ///
    /// If the expression is a known constant, this returns a fixed dimension.
    pub fn from_ir_expr(expr: ExprRef) -> Dimension {
        match expr.get().const_value() {
            Some(value) => Dimension::Fixed(value),
            None => DimExpr::Expr(expr).into(),
        }
    }

    pub fn kind(&self) -> DimKind {
        match self {
            Self::Fixed(_) => DimKind::Fixed,
            Self::Dynamic(_) => DimKind::Dynamic,
            Self::Unknown => DimKind::Unknown,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Return the value of this dimension if it is fixed.
    pub fn as_fixed(&self) -> Option<i64> {
        match self {
            Self::Fixed(value) => Some(*value),
            _ => None,
        }
    }

    /// Return the value of this dimension, or an error if it is not fixed.
    pub fn fixed_value(&self) -> Result<i64, DimError> {
        self.as_fixed()
            .ok_or_else(|| DimError::NotFixed(self.to_string()))
    }

    /// Return the expression node if this dimension is dynamic.
    pub fn expr(&self) -> Option<&DimExpr> {
        match self {
            Self::Dynamic(dim) => Some(dim.expr()),
            _ => None,
        }
    }

    /// Return the variable if this dimension is a single free variable.
    pub fn as_var(&self) -> Option<&DimVar> {
        match self.expr() {
            Some(DimExpr::Var(var)) => Some(var),
            _ => None,
        }
    }

    /// Range of values this dimension may take.
    pub fn range(&self) -> ValueRange {
        match self {
            Self::Fixed(value) => ValueRange::point(*value),
            Self::Dynamic(dim) => dim.range(),
            Self::Unknown => ValueRange::full(),
        }
    }

    /// Return true if this dimension is known to be `>= 0`.
    pub fn is_provably_non_negative(&self) -> bool {
        self.range().is_non_negative()
    }

    /// Total order used to sort operands into canonical order.
    ///
    /// Constants sort first, then variables in creation order, then other
    /// expressions grouped by type.
    pub(crate) fn canonical_cmp(&self, other: &Dimension) -> Ordering {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a.cmp(b),
            (Self::Fixed(_), _) => Ordering::Less,
            (_, Self::Fixed(_)) => Ordering::Greater,
            (Self::Unknown, Self::Unknown) => Ordering::Equal,
            (Self::Unknown, _) => Ordering::Greater,
            (_, Self::Unknown) => Ordering::Less,
            (Self::Dynamic(a), Self::Dynamic(b)) => {
                if a.ptr_eq(b) {
                    return Ordering::Equal;
                }
                cmp_exprs(a.expr(), b.expr())
            }
        }
    }
}

fn cmp_lists(a: &[Dimension], b: &[Dimension]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.canonical_cmp(y))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

fn cmp_seq<'a>(pairs: impl IntoIterator<Item = (&'a Dimension, &'a Dimension)>) -> Ordering {
    pairs
        .into_iter()
        .map(|(x, y)| x.canonical_cmp(y))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn cmp_exprs(a: &DimExpr, b: &DimExpr) -> Ordering {
    use DimExpr as E;

    let by_variant = a.variant_rank().cmp(&b.variant_rank());
    if by_variant.is_ne() {
        return by_variant;
    }

    match (a, b) {
        (E::Var(a), E::Var(b)) => a.canonical_cmp(b),
        (
            E::Product {
                operands: a_ops,
                scale: a_scale,
            },
            E::Product {
                operands: b_ops,
                scale: b_scale,
            },
        ) => cmp_lists(a_ops, b_ops).then(a_scale.cmp(b_scale)),
        (
            E::Sum {
                operands: a_ops,
                bias: a_bias,
            },
            E::Sum {
                operands: b_ops,
                bias: b_bias,
            },
        ) => cmp_lists(a_ops, b_ops).then(a_bias.cmp(b_bias)),
        (
            E::Fraction {
                numerator: an,
                denominator: ad,
                mode: am,
            },
            E::Fraction {
                numerator: bn,
                denominator: bd,
                mode: bm,
            },
        ) => cmp_seq([(an, bn), (ad, bd)]).then((*am as u8).cmp(&(*bm as u8))),
        (
            E::Remainder {
                numerator: an,
                denominator: ad,
            },
            E::Remainder {
                numerator: bn,
                denominator: bd,
            },
        ) => cmp_seq([(an, bn), (ad, bd)]),
        (
            E::Power {
                base: a_base,
                power: a_pow,
            },
            E::Power {
                base: b_base,
                power: b_pow,
            },
        ) => a_base.canonical_cmp(b_base).then(a_pow.cmp(b_pow)),
        (E::Abs(a), E::Abs(b)) => a.canonical_cmp(b),
        (
            E::Clamp {
                operand: ax,
                min: alo,
                max: ahi,
            },
            E::Clamp {
                operand: bx,
                min: blo,
                max: bhi,
            },
        ) => cmp_seq([(ax, bx), (alo, blo), (ahi, bhi)]),
        (
            E::CompareAndSelect {
                value: av,
                expected: ae,
                true_value: at,
                false_value: af,
            },
            E::CompareAndSelect {
                value: bv,
                expected: be,
                true_value: bt,
                false_value: bf,
            },
        ) => cmp_seq([(av, bv), (ae, be), (at, bt), (af, bf)]),
        (E::Min(a), E::Min(b)) | (E::Max(a), E::Max(b)) => cmp_lists(a, b),
        (
            E::Positive {
                index: ai,
                extent: ae,
            },
            E::Positive {
                index: bi,
                extent: be,
            },
        ) => cmp_seq([(ai, bi), (ae, be)]),
        (
            E::At {
                shape: a_shape,
                index: ai,
            },
            E::At {
                shape: b_shape,
                index: bi,
            },
        ) => a_shape.canonical_cmp(b_shape).then_with(|| ai.canonical_cmp(bi)),
        (E::Expr(a), E::Expr(b)) => a.to_string().cmp(&b.to_string()),
        _ => Ordering::Equal,
    }
}

impl From<DimExpr> for Dimension {
    fn from(expr: DimExpr) -> Dimension {
        Dimension::Dynamic(DynDim::new(expr))
    }
}

impl From<i64> for Dimension {
    fn from(value: i64) -> Dimension {
        Dimension::Fixed(value)
    }
}

impl From<i32> for Dimension {
    fn from(value: i32) -> Dimension {
        Dimension::Fixed(value as i64)
    }
}

/// Sizes above `i64::MAX` saturate.
impl From<usize> for Dimension {
    fn from(value: usize) -> Dimension {
        Dimension::Fixed(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<DimVar> for Dimension {
    fn from(var: DimVar) -> Dimension {
        Dimension::var(var)
    }
}

/// Return true if `a` and `b` contain the same elements, in any order.
fn same_elements(a: &[Dimension], b: &[Dimension]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used: SmallVec<[bool; 8]> = SmallVec::from_elem(false, b.len());
    a.iter().all(|x| {
        let pos = b
            .iter()
            .enumerate()
            .position(|(i, y)| !used[i] && x == y);
        if let Some(pos) = pos {
            used[pos] = true;
            true
        } else {
            false
        }
    })
}

impl PartialEq for DimExpr {
    fn eq(&self, other: &DimExpr) -> bool {
        use DimExpr as E;

        match (self, other) {
            (E::Var(a), E::Var(b)) => a == b,
            (
                E::Product {
                    operands: a_ops,
                    scale: a_scale,
                },
                E::Product {
                    operands: b_ops,
                    scale: b_scale,
                },
            ) => a_scale == b_scale && same_elements(a_ops, b_ops),
            (
                E::Sum {
                    operands: a_ops,
                    bias: a_bias,
                },
                E::Sum {
                    operands: b_ops,
                    bias: b_bias,
                },
            ) => a_bias == b_bias && same_elements(a_ops, b_ops),
            (
                E::Fraction {
                    numerator: an,
                    denominator: ad,
                    mode: am,
                },
                E::Fraction {
                    numerator: bn,
                    denominator: bd,
                    mode: bm,
                },
            ) => am == bm && an == bn && ad == bd,
            (
                E::Remainder {
                    numerator: an,
                    denominator: ad,
                },
                E::Remainder {
                    numerator: bn,
                    denominator: bd,
                },
            ) => an == bn && ad == bd,
            (
                E::Power {
                    base: a_base,
                    power: a_pow,
                },
                E::Power {
                    base: b_base,
                    power: b_pow,
                },
            ) => a_pow == b_pow && a_base == b_base,
            (E::Abs(a), E::Abs(b)) => a == b,
            (
                E::Clamp {
                    operand: ax,
                    min: alo,
                    max: ahi,
                },
                E::Clamp {
                    operand: bx,
                    min: blo,
                    max: bhi,
                },
            ) => ax == bx && alo == blo && ahi == bhi,
            (
                E::CompareAndSelect {
                    value: av,
                    expected: ae,
                    true_value: at,
                    false_value: af,
                },
                E::CompareAndSelect {
                    value: bv,
                    expected: be,
                    true_value: bt,
                    false_value: bf,
                },
            ) => av == bv && ae == be && at == bt && af == bf,
            (E::Min(a), E::Min(b)) | (E::Max(a), E::Max(b)) => same_elements(a, b),
            (
                E::Positive {
                    index: ai,
                    extent: ae,
                },
                E::Positive {
                    index: bi,
                    extent: be,
                },
            ) => ai == bi && ae == be,
            (
                E::At {
                    shape: a_shape,
                    index: ai,
                },
                E::At {
                    shape: b_shape,
                    index: bi,
                },
            ) => ai == bi && a_shape == b_shape,
            (E::Expr(a), E::Expr(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DimExpr {}

/// Hash a list of operands independently of their order, so that hashing
/// is consistent with [`same_elements`].
fn hash_unordered<H: Hasher>(operands: &[Dimension], state: &mut H) {
    let combined = operands.iter().fold(0u64, |acc, op| {
        let mut hasher = FxHasher::default();
        op.hash(&mut hasher);
        acc.wrapping_add(hasher.finish())
    });
    operands.len().hash(state);
    combined.hash(state);
}

impl Hash for DimExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use DimExpr as E;

        self.variant_rank().hash(state);
        match self {
            E::Var(var) => var.hash(state),
            E::Product { operands, scale } => {
                scale.hash(state);
                hash_unordered(operands, state);
            }
            E::Sum { operands, bias } => {
                bias.hash(state);
                hash_unordered(operands, state);
            }
            E::Fraction {
                numerator,
                denominator,
                mode,
            } => {
                numerator.hash(state);
                denominator.hash(state);
                mode.hash(state);
            }
            E::Remainder {
                numerator,
                denominator,
            } => {
                numerator.hash(state);
                denominator.hash(state);
            }
            E::Power { base, power } => {
                base.hash(state);
                power.hash(state);
            }
            E::Abs(operand) => operand.hash(state),
            E::Clamp { operand, min, max } => {
                operand.hash(state);
                min.hash(state);
                max.hash(state);
            }
            E::CompareAndSelect {
                value,
                expected,
                true_value,
                false_value,
            } => {
                value.hash(state);
                expected.hash(state);
                true_value.hash(state);
                false_value.hash(state);
            }
            E::Min(operands) | E::Max(operands) => hash_unordered(operands, state),
            E::Positive { index, extent } => {
                index.hash(state);
                extent.hash(state);
            }
            E::At { shape, index } => {
                shape.hash(state);
                index.hash(state);
            }
            E::Expr(expr) => expr.hash(state),
        }
    }
}

impl PartialEq for DynDim {
    fn eq(&self, other: &DynDim) -> bool {
        self.ptr_eq(other) || self.expr() == other.expr()
    }
}

impl Eq for DynDim {}

impl PartialEq for Dimension {
    fn eq(&self, other: &Dimension) -> bool {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::Dynamic(a), Self::Dynamic(b)) => a == b,
            (Self::Unknown, Self::Unknown) => true,
            _ => false,
        }
    }
}

impl Eq for Dimension {}

impl Hash for Dimension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Fixed(value) => value.hash(state),
            Self::Dynamic(dim) => dim.expr().hash(state),
            Self::Unknown => {}
        }
    }
}

/// Write a list of operands separated by `sep`.
fn write_list(
    f: &mut fmt::Formatter<'_>,
    operands: &[Dimension],
    sep: &str,
    debug: bool,
) -> fmt::Result {
    for (i, op) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        op.write(f, debug)?;
    }
    Ok(())
}

impl Dimension {
    /// Shared implementation of `Display` and `Debug`.
    ///
    /// The debug format additionally shows the creation index of variables,
    /// which distinguishes variables with the same name.
    fn write(&self, f: &mut fmt::Formatter<'_>, debug: bool) -> fmt::Result {
        let expr = match self {
            Self::Fixed(value) => return write!(f, "{value}"),
            Self::Unknown => return write!(f, "?"),
            Self::Dynamic(dim) => dim.expr(),
        };

        match expr {
            DimExpr::Var(var) => {
                if debug {
                    write!(f, "{:?}", var)
                } else {
                    write!(f, "{}", var)
                }
            }
            DimExpr::Product { operands, scale } => {
                write!(f, "(")?;
                write_list(f, operands, " * ", debug)?;
                if *scale != 1 || operands.is_empty() {
                    if !operands.is_empty() {
                        write!(f, " * ")?;
                    }
                    write!(f, "{scale}")?;
                }
                write!(f, ")")
            }
            DimExpr::Sum { operands, bias } => {
                write!(f, "(")?;
                write_list(f, operands, " + ", debug)?;
                match *bias {
                    0 if !operands.is_empty() => {}
                    bias if operands.is_empty() => write!(f, "{bias}")?,
                    bias if bias < 0 => write!(f, " - {}", bias.unsigned_abs())?,
                    bias => write!(f, " + {bias}")?,
                }
                write!(f, ")")
            }
            DimExpr::Fraction {
                numerator,
                denominator,
                mode,
            } => match mode {
                DivMode::Floor => {
                    write!(f, "(")?;
                    numerator.write(f, debug)?;
                    write!(f, " / ")?;
                    denominator.write(f, debug)?;
                    write!(f, ")")
                }
                DivMode::Ceil => {
                    write!(f, "ceil_div(")?;
                    numerator.write(f, debug)?;
                    write!(f, ", ")?;
                    denominator.write(f, debug)?;
                    write!(f, ")")
                }
            },
            DimExpr::Remainder {
                numerator,
                denominator,
            } => {
                write!(f, "(")?;
                numerator.write(f, debug)?;
                write!(f, " % ")?;
                denominator.write(f, debug)?;
                write!(f, ")")
            }
            DimExpr::Power { base, power } => {
                write!(f, "pow(")?;
                base.write(f, debug)?;
                write!(f, ", {power})")
            }
            DimExpr::Abs(operand) => {
                write!(f, "abs(")?;
                operand.write(f, debug)?;
                write!(f, ")")
            }
            DimExpr::Clamp { operand, min, max } => {
                write!(f, "clamp(")?;
                write_list(f, &[operand.clone(), min.clone(), max.clone()], ", ", debug)?;
                write!(f, ")")
            }
            DimExpr::CompareAndSelect {
                value,
                expected,
                true_value,
                false_value,
            } => {
                write!(f, "select(")?;
                value.write(f, debug)?;
                write!(f, " == ")?;
                expected.write(f, debug)?;
                write!(f, ", ")?;
                true_value.write(f, debug)?;
                write!(f, ", ")?;
                false_value.write(f, debug)?;
                write!(f, ")")
            }
            DimExpr::Min(operands) => {
                write!(f, "min(")?;
                write_list(f, operands, ", ", debug)?;
                write!(f, ")")
            }
            DimExpr::Max(operands) => {
                write!(f, "max(")?;
                write_list(f, operands, ", ", debug)?;
                write!(f, ")")
            }
            DimExpr::Positive { index, extent } => {
                write!(f, "positive(")?;
                index.write(f, debug)?;
                write!(f, ", ")?;
                extent.write(f, debug)?;
                write!(f, ")")
            }
            DimExpr::At { shape, index } => {
                if debug {
                    write!(f, "{:?}[", shape)?;
                } else {
                    write!(f, "{}[", shape)?;
                }
                index.write(f, debug)?;
                write!(f, "]")
            }
            DimExpr::Expr(expr) => write!(f, "dim({})", expr),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, false)
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, true)
    }
}

impl fmt::Debug for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Dimension::from(self.clone()))
    }
}

impl fmt::Debug for DynDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Dimension::Dynamic(self.clone()))
    }
}
