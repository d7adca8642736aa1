//! Shapes of tensor values.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Index, Mul, Rem, Sub};

use smallvec::SmallVec;

use crate::dim::{DimExpr, Dimension};
use crate::errors::{DimError, ShapeError};
use crate::expr::ExprRef;
use crate::var::ShapeVar;

/// Storage for the dimensions of a [`RankedShape`].
pub type DimVec = SmallVec<[Dimension; 4]>;

/// Coarse classification of a [`Shape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// The shape is an error sentinel.
    Invalid,
    /// The rank is not known.
    Unranked,
    /// The rank is known, but at least one dimension is not fixed.
    HasUnknownDimension,
    /// The rank and every dimension are known.
    Fixed,
}

pub(crate) fn kind_of<'a>(dims: impl IntoIterator<Item = &'a Dimension>) -> ShapeKind {
    if dims.into_iter().all(|d| d.is_fixed()) {
        ShapeKind::Fixed
    } else {
        ShapeKind::HasUnknownDimension
    }
}

/// Convert a size or position to an `i64`, saturating at `i64::MAX`.
fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Resolve a possibly negative index against `rank`.
fn resolve_index(index: i64, rank: usize) -> Result<usize, ShapeError> {
    let out_of_range = || ShapeError::IndexOutOfRange { index, rank };
    let rank_i64 = saturating_i64(rank);
    let resolved = if index < 0 {
        index.checked_add(rank_i64).ok_or_else(out_of_range)?
    } else {
        index
    };
    if !(0..rank_i64).contains(&resolved) {
        return Err(out_of_range());
    }
    usize::try_from(resolved).map_err(|_| out_of_range())
}

/// A shape with a known number of dimensions.
///
/// The [`kind`](RankedShape::kind) is computed whenever a shape is
/// constructed. Shapes are never modified in place. Methods such as
/// [`with_dim`](RankedShape::with_dim) return new shapes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RankedShape {
    dims: DimVec,
    kind: ShapeKind,
}

impl RankedShape {
    pub fn new(dims: impl IntoIterator<Item = Dimension>) -> Self {
        let dims: DimVec = dims.into_iter().collect();
        let kind = kind_of(dims.iter());
        RankedShape { dims, kind }
    }

    /// Shape of a scalar, with zero dimensions.
    pub fn scalar() -> Self {
        Self::new([])
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn is_fixed(&self) -> bool {
        self.kind == ShapeKind::Fixed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.dims.iter()
    }

    /// Return a shape with the same rank as `self` and new dimensions.
    pub fn with_dims(&self, dims: impl IntoIterator<Item = Dimension>) -> RankedShape {
        RankedShape::new(dims)
    }

    /// Return a copy of this shape with the dimension at `index` replaced.
    pub fn with_dim(&self, index: usize, dim: Dimension) -> Result<RankedShape, ShapeError> {
        if index >= self.rank() {
            return Err(ShapeError::IndexOutOfRange {
                index: saturating_i64(index),
                rank: self.rank(),
            });
        }
        let mut dims = self.dims.clone();
        dims[index] = dim;
        Ok(RankedShape::new(dims))
    }
}

impl Index<usize> for RankedShape {
    type Output = Dimension;

    fn index(&self, index: usize) -> &Dimension {
        &self.dims[index]
    }
}

impl FromIterator<Dimension> for RankedShape {
    fn from_iter<I: IntoIterator<Item = Dimension>>(iter: I) -> Self {
        RankedShape::new(iter)
    }
}

/// A shape whose rank is not known at this layer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UnrankedShape {
    expr: Option<ExprRef>,
}

impl UnrankedShape {
    /// Expression which computes the shape at runtime, if any.
    pub fn expr(&self) -> Option<&ExprRef> {
        self.expr.as_ref()
    }
}

/// The shape of the value produced by an operator IR expression.
///
/// Queries are answered using the shape that type inference has assigned
/// to the expression, if any.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShapeOf {
    expr: ExprRef,
}

impl ShapeOf {
    pub fn expr(&self) -> &ExprRef {
        &self.expr
    }

    pub fn inferred_shape(&self) -> Option<Shape> {
        self.expr.get().inferred_shape()
    }
}

/// Shape of a tensor value.
///
/// ```
/// use rten_dims::{Shape, ShapeKind, VarScope};
///
/// let scope = VarScope::new();
/// let n = scope.dim_var("n");
/// let shape = Shape::from(vec![n, 3.into(), 224.into(), 224.into()]);
///
/// assert_eq!(shape.rank(), Ok(4));
/// assert_eq!(shape.kind(), ShapeKind::HasUnknownDimension);
/// assert_eq!(shape.to_string(), "[n,3,224,224]");
///
/// let scaled = (&shape * &Shape::from([1, 1, 2, 2])).simplify().unwrap();
/// assert_eq!(scaled.to_string(), "[n,3,448,448]");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Error sentinel. Most queries on an invalid shape fail.
    Invalid,
    /// Shape whose rank is not known.
    Unranked(UnrankedShape),
    /// Shape with a known rank.
    Ranked(RankedShape),
    /// Shape of an operator IR expression.
    Of(ShapeOf),
    /// Free variable standing for a shape of known rank.
    Var(ShapeVar),
}

/// Shape expressed as a value of the operator IR.
///
/// See [`Shape::to_value_array_expr`].
#[derive(Clone, Debug, PartialEq)]
pub enum ValueArrayExpr {
    /// All dimensions are known.
    Const(Vec<i64>),
    /// A 1D tensor formed by stacking scalar dimensions.
    Stack(Vec<Dimension>),
    /// A shape variable, bound at runtime.
    Var(ShapeVar),
    /// The runtime shape of an expression's value.
    ShapeOf(ExprRef),
    /// An expression which computes the shape.
    Expr(ExprRef),
}

impl Shape {
    pub fn invalid() -> Shape {
        Shape::Invalid
    }

    /// Create an unranked shape that is not backed by an expression.
    pub fn unranked() -> Shape {
        Shape::Unranked(UnrankedShape { expr: None })
    }

    /// Create an unranked shape computed by `expr` at runtime.
    pub fn unranked_of(expr: ExprRef) -> Shape {
        Shape::Unranked(UnrankedShape { expr: Some(expr) })
    }

    /// Create a shape mirroring the shape of `expr`'s value.
    pub fn of(expr: ExprRef) -> Shape {
        Shape::Of(ShapeOf { expr })
    }

    pub fn scalar() -> Shape {
        Shape::Ranked(RankedShape::scalar())
    }

    pub fn ranked(dims: impl IntoIterator<Item = Dimension>) -> Shape {
        Shape::Ranked(RankedShape::new(dims))
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Invalid => ShapeKind::Invalid,
            Self::Unranked(_) => ShapeKind::Unranked,
            Self::Ranked(shape) => shape.kind(),
            Self::Of(shape_of) => shape_of
                .inferred_shape()
                .map(|s| s.kind())
                .unwrap_or(ShapeKind::Unranked),
            Self::Var(var) => {
                if var.rank() == 0 {
                    ShapeKind::Fixed
                } else {
                    ShapeKind::HasUnknownDimension
                }
            }
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.kind() == ShapeKind::Invalid
    }

    pub fn is_unranked(&self) -> bool {
        self.kind() == ShapeKind::Unranked
    }

    /// Return true if the rank of this shape is known.
    pub fn is_ranked(&self) -> bool {
        matches!(
            self.kind(),
            ShapeKind::Fixed | ShapeKind::HasUnknownDimension
        )
    }

    pub fn is_fixed(&self) -> bool {
        self.kind() == ShapeKind::Fixed
    }

    pub fn has_unknown_dimension(&self) -> bool {
        self.kind() == ShapeKind::HasUnknownDimension
    }

    fn invalid_op(&self, op: &'static str) -> ShapeError {
        ShapeError::InvalidOperation {
            op,
            shape: self.to_string(),
        }
    }

    /// Return the number of dimensions.
    ///
    /// Fails if the shape is invalid or unranked.
    pub fn rank(&self) -> Result<usize, ShapeError> {
        match self {
            Self::Ranked(shape) => Ok(shape.rank()),
            Self::Var(var) => Ok(var.rank()),
            Self::Of(shape_of) => match shape_of.inferred_shape() {
                Some(shape) => shape.rank(),
                None => Err(self.invalid_op("rank")),
            },
            Self::Invalid | Self::Unranked(_) => Err(self.invalid_op("rank")),
        }
    }

    /// Return the dimensions of this shape if they are available without
    /// creating new expressions.
    pub(crate) fn known_dims(&self) -> Option<Vec<Dimension>> {
        match self {
            Self::Ranked(shape) => Some(shape.dims().to_vec()),
            Self::Of(shape_of) => shape_of.inferred_shape()?.known_dims(),
            _ => None,
        }
    }

    /// Return the dimensions of this shape.
    ///
    /// The dimensions of a shape variable are expressed as indexed reads of
    /// the variable.
    pub fn to_dims(&self) -> Result<Vec<Dimension>, ShapeError> {
        if let Some(dims) = self.known_dims() {
            return Ok(dims);
        }
        match self {
            Self::Var(var) => Ok((0..var.rank())
                .map(|i| self.at_unchecked(Dimension::from(i)))
                .collect()),
            _ => Err(self.invalid_op("dimensions")),
        }
    }

    fn at_unchecked(&self, index: Dimension) -> Dimension {
        DimExpr::At {
            shape: self.clone(),
            index,
        }
        .into()
    }

    /// Return the dimension at `index`. Negative indices count back from the
    /// last dimension.
    pub fn dim(&self, index: isize) -> Result<Dimension, ShapeError> {
        // `isize` is at most 64 bits on every supported target.
        self.dim_fixed(index as i64)
    }

    fn dim_fixed(&self, index: i64) -> Result<Dimension, ShapeError> {
        let rank = self.rank()?;
        let resolved = resolve_index(index, rank)?;
        match self.known_dims() {
            Some(dims) => Ok(dims[resolved].clone()),
            None => Ok(self.at_unchecked(Dimension::from(resolved))),
        }
    }

    /// Return the dimension at a possibly symbolic `index`.
    ///
    /// If the index is fixed this is the same as [`dim`](Shape::dim).
    /// Otherwise an indexed read is created, which is resolved when the
    /// expression is simplified after the index becomes known.
    pub fn dim_at(&self, index: &Dimension) -> Result<Dimension, ShapeError> {
        match index {
            Dimension::Fixed(i) => self.dim_fixed(*i),
            Dimension::Unknown if !self.is_invalid() => Ok(Dimension::Unknown),
            Dimension::Dynamic(_) if matches!(self, Self::Unranked(UnrankedShape { expr: Some(_) })) => {
                Ok(self.at_unchecked(index.clone()))
            }
            _ => {
                self.rank()?;
                Ok(self.at_unchecked(index.clone()))
            }
        }
    }

    /// Return the concrete dimension sizes.
    ///
    /// Fails unless the shape is fixed.
    pub fn to_value_array(&self) -> Result<Vec<i64>, ShapeError> {
        match self.kind() {
            ShapeKind::Invalid => Err(self.invalid_op("value array")),
            ShapeKind::Fixed => self
                .to_dims()?
                .iter()
                .map(|d| d.as_fixed().ok_or_else(|| ShapeError::NotFixed(self.to_string())))
                .collect(),
            _ => Err(ShapeError::NotFixed(self.to_string())),
        }
    }

    /// Express this shape as a value of the operator IR.
    pub fn to_value_array_expr(&self) -> Result<ValueArrayExpr, ShapeError> {
        if self.is_fixed()
            && let Ok(values) = self.to_value_array()
        {
            return Ok(ValueArrayExpr::Const(values));
        }
        match self {
            Self::Ranked(shape) => Ok(ValueArrayExpr::Stack(shape.dims().to_vec())),
            Self::Var(var) => Ok(ValueArrayExpr::Var(var.clone())),
            Self::Of(shape_of) => Ok(ValueArrayExpr::ShapeOf(shape_of.expr().clone())),
            Self::Unranked(UnrankedShape { expr: Some(expr) }) => {
                Ok(ValueArrayExpr::Expr(expr.clone()))
            }
            Self::Unranked(_) | Self::Invalid => Err(self.invalid_op("value array expression")),
        }
    }

    /// Return true if a value of shape `other` can be used where a value of
    /// shape `self` is expected.
    ///
    /// Unknown dimensions in `self` accept any size. Symbolic dimensions
    /// accept fixed sizes within their range, or an identical expression.
    pub fn is_assignable_from(&self, other: &Shape) -> bool {
        if self.is_invalid() || other.is_invalid() {
            return false;
        }
        if self.is_unranked() {
            return true;
        }
        if other.is_unranked() {
            return false;
        }
        if self == other {
            return true;
        }

        let (Ok(expected), Ok(actual)) = (self.to_dims(), other.to_dims()) else {
            return false;
        };
        expected.len() == actual.len()
            && expected
                .iter()
                .zip(&actual)
                .all(|(e, a)| dim_assignable_from(e, a))
    }

    /// Return the product of all dimensions, simplified.
    pub fn prod(&self) -> Result<Dimension, ShapeError> {
        let product: Dimension = self.to_dims()?.into_iter().product();
        Ok(product.simplify()?)
    }

    /// Return a copy of this shape with `dim` inserted at `index`.
    pub fn insert_and_clone(&self, index: usize, dim: Dimension) -> Result<Shape, ShapeError> {
        let mut dims = self.to_dims()?;
        if index > dims.len() {
            return Err(ShapeError::IndexOutOfRange {
                index: saturating_i64(index),
                rank: dims.len(),
            });
        }
        dims.insert(index, dim);
        Ok(Shape::ranked(dims))
    }

    /// Combine the dimensions of two shapes of equal rank using `op`.
    fn zip_dims(
        &self,
        rhs: &Shape,
        op: impl Fn(&Dimension, &Dimension) -> Result<Dimension, DimError>,
    ) -> Result<Shape, ShapeError> {
        let lhs_dims = self.to_dims()?;
        let rhs_dims = rhs.to_dims()?;
        if lhs_dims.len() != rhs_dims.len() {
            return Err(ShapeError::RankMismatch {
                lhs: self.to_string(),
                rhs: rhs.to_string(),
            });
        }
        let dims = lhs_dims
            .iter()
            .zip(&rhs_dims)
            .map(|(a, b)| op(a, b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shape::ranked(dims))
    }

    /// Combine each dimension of this shape with `rhs` using `op`.
    fn map_dims(
        &self,
        rhs: &Dimension,
        op: impl Fn(&Dimension, &Dimension) -> Result<Dimension, DimError>,
    ) -> Result<Shape, ShapeError> {
        let dims = self
            .to_dims()?
            .iter()
            .map(|d| op(d, rhs))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shape::ranked(dims))
    }

    /// Broadcast two shapes together using NumPy-style rules.
    ///
    /// Dimensions are aligned from the end. A dimension of size 1 is
    /// stretched to match the other. If either input is unranked, the result
    /// is unranked.
    pub fn broadcast(&self, other: &Shape) -> Result<Shape, ShapeError> {
        if self.is_invalid() || other.is_invalid() {
            let invalid = if self.is_invalid() { self } else { other };
            return Err(invalid.invalid_op("broadcast"));
        }
        if self.is_unranked() || other.is_unranked() {
            return Ok(Shape::unranked());
        }

        let a = self.to_dims()?;
        let b = other.to_dims()?;
        let rank = a.len().max(b.len());
        let one = Dimension::Fixed(1);

        let mut dims = Vec::with_capacity(rank);
        for i in 0..rank {
            let da = (i + a.len()).checked_sub(rank).map_or(&one, |j| &a[j]);
            let db = (i + b.len()).checked_sub(rank).map_or(&one, |j| &b[j]);
            let dim = match (da, db) {
                _ if da == db => da.clone(),
                (Dimension::Fixed(1), _) => db.clone(),
                (_, Dimension::Fixed(1)) => da.clone(),
                (Dimension::Fixed(_), Dimension::Fixed(_)) => {
                    return Err(ShapeError::Incompatible {
                        lhs: self.to_string(),
                        rhs: other.to_string(),
                    });
                }
                _ => da.max(db),
            };
            dims.push(dim);
        }
        Ok(Shape::ranked(dims))
    }

    /// Total order used when shapes appear inside canonical expressions.
    pub(crate) fn canonical_cmp(&self, other: &Shape) -> Ordering {
        fn rank(shape: &Shape) -> u8 {
            match shape {
                Shape::Invalid => 0,
                Shape::Unranked(_) => 1,
                Shape::Ranked(_) => 2,
                Shape::Of(_) => 3,
                Shape::Var(_) => 4,
            }
        }

        match (self, other) {
            (Self::Ranked(a), Self::Ranked(b)) => a.rank().cmp(&b.rank()).then_with(|| {
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.canonical_cmp(y))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
            (Self::Var(a), Self::Var(b)) => a.canonical_cmp(b),
            (Self::Of(_), Self::Of(_)) | (Self::Unranked(_), Self::Unranked(_)) => {
                self.to_string().cmp(&other.to_string())
            }
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// Return true if a dimension of size `actual` can be used where `expected`
/// is required.
fn dim_assignable_from(expected: &Dimension, actual: &Dimension) -> bool {
    match (expected, actual) {
        (Dimension::Unknown, _) => true,
        (Dimension::Fixed(e), _) => actual.as_fixed() == Some(*e),
        (Dimension::Dynamic(dim), Dimension::Fixed(value)) => dim.range().contains(*value),
        (Dimension::Dynamic(_), _) => expected == actual,
    }
}

macro_rules! impl_shape_op {
    ($trait:ident, $method:ident, $checked_method:ident, $checked_dim_method:ident, $op:expr, $doc:literal) => {
        impl Shape {
            #[doc = concat!("Elementwise ", $doc, " of two shapes with the same rank.")]
            pub fn $checked_method(&self, rhs: &Shape) -> Result<Shape, ShapeError> {
                self.zip_dims(rhs, $op)
            }

            #[doc = concat!("Elementwise ", $doc, " of each dimension and a scalar.")]
            pub fn $checked_dim_method(&self, rhs: &Dimension) -> Result<Shape, ShapeError> {
                self.map_dims(rhs, $op)
            }
        }

        impl $trait<&Shape> for &Shape {
            type Output = Shape;

            fn $method(self, rhs: &Shape) -> Shape {
                self.$checked_method(rhs)
                    .unwrap_or_else(|err| panic!("{}", err))
            }
        }

        impl $trait<Shape> for Shape {
            type Output = Shape;

            fn $method(self, rhs: Shape) -> Shape {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&Dimension> for &Shape {
            type Output = Shape;

            fn $method(self, rhs: &Dimension) -> Shape {
                self.$checked_dim_method(rhs)
                    .unwrap_or_else(|err| panic!("{}", err))
            }
        }

        impl $trait<Dimension> for Shape {
            type Output = Shape;

            fn $method(self, rhs: Dimension) -> Shape {
                (&self).$method(&rhs)
            }
        }
    };
}

impl_shape_op!(
    Add,
    add,
    checked_add,
    checked_add_dim,
    |a: &Dimension, b: &Dimension| Ok(a + b),
    "sum"
);
impl_shape_op!(
    Sub,
    sub,
    checked_sub,
    checked_sub_dim,
    |a: &Dimension, b: &Dimension| Ok(a - b),
    "difference"
);
impl_shape_op!(
    Mul,
    mul,
    checked_mul,
    checked_mul_dim,
    |a: &Dimension, b: &Dimension| Ok(a * b),
    "product"
);
impl_shape_op!(
    Div,
    div,
    checked_div,
    checked_div_dim,
    |a: &Dimension, b: &Dimension| a.checked_div(b),
    "floor division"
);
impl_shape_op!(
    Rem,
    rem,
    checked_rem,
    checked_rem_dim,
    |a: &Dimension, b: &Dimension| a.checked_rem(b),
    "remainder"
);

impl From<RankedShape> for Shape {
    fn from(shape: RankedShape) -> Shape {
        Shape::Ranked(shape)
    }
}

impl From<Vec<Dimension>> for Shape {
    fn from(dims: Vec<Dimension>) -> Shape {
        Shape::ranked(dims)
    }
}

impl From<&[Dimension]> for Shape {
    fn from(dims: &[Dimension]) -> Shape {
        Shape::ranked(dims.iter().cloned())
    }
}

impl From<&[i64]> for Shape {
    fn from(dims: &[i64]) -> Shape {
        Shape::ranked(dims.iter().map(|&d| Dimension::Fixed(d)))
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Shape {
        Shape::from(dims.as_slice())
    }
}

impl<const N: usize> From<[i64; N]> for Shape {
    fn from(dims: [i64; N]) -> Shape {
        Shape::from(dims.as_slice())
    }
}

impl From<ShapeVar> for Shape {
    fn from(var: ShapeVar) -> Shape {
        Shape::Var(var)
    }
}

impl FromIterator<Dimension> for Shape {
    fn from_iter<I: IntoIterator<Item = Dimension>>(iter: I) -> Self {
        Shape::ranked(iter)
    }
}

impl Shape {
    fn write(&self, f: &mut fmt::Formatter<'_>, debug: bool) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "[invalid]"),
            Self::Unranked(_) => write!(f, "[*]"),
            Self::Ranked(shape) => {
                write!(f, "[")?;
                for (i, dim) in shape.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if debug {
                        write!(f, "{:?}", dim)?;
                    } else {
                        write!(f, "{}", dim)?;
                    }
                }
                write!(f, "]")
            }
            Self::Of(shape_of) => write!(f, "shape_of({})", shape_of.expr()),
            Self::Var(var) => {
                if debug {
                    write!(f, "{:?}", var)
                } else {
                    write!(f, "{}", var)
                }
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, false)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, true)
    }
}

impl fmt::Debug for RankedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Shape::Ranked(self.clone()))
    }
}

impl fmt::Display for RankedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Shape::Ranked(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::hash::{BuildHasher, Hash};

    use rustc_hash::FxBuildHasher;

    use super::{RankedShape, Shape, ShapeKind, ValueArrayExpr};
    use crate::dim::{DimExpr, Dimension};
    use crate::errors::{DimError, ShapeError};
    use crate::expr::{ExprRef, IrExpr};
    use crate::testing::TestCases;
    use crate::value_range::ValueRange;
    use crate::var::VarScope;

    /// Operator IR expression with a known output shape.
    #[derive(Debug)]
    struct TypedValue {
        name: &'static str,
        shape: Option<Shape>,
    }

    impl fmt::Display for TypedValue {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.name)
        }
    }

    impl IrExpr for TypedValue {
        fn inferred_shape(&self) -> Option<Shape> {
            self.shape.clone()
        }
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        FxBuildHasher.hash_one(value)
    }

    #[test]
    fn test_kind() {
        let scope = VarScope::new();

        #[derive(Debug)]
        struct Case {
            shape: Shape,
            kind: ShapeKind,
        }

        let cases = [
            Case {
                shape: Shape::from([1, 3, 224, 224]),
                kind: ShapeKind::Fixed,
            },
            Case {
                shape: Shape::scalar(),
                kind: ShapeKind::Fixed,
            },
            Case {
                shape: Shape::from(vec![scope.dim_var("n"), 3.into()]),
                kind: ShapeKind::HasUnknownDimension,
            },
            Case {
                shape: Shape::from(vec![Dimension::Unknown]),
                kind: ShapeKind::HasUnknownDimension,
            },
            Case {
                shape: Shape::invalid(),
                kind: ShapeKind::Invalid,
            },
            Case {
                shape: Shape::unranked(),
                kind: ShapeKind::Unranked,
            },
            Case {
                shape: scope.shape_var("s", 2),
                kind: ShapeKind::HasUnknownDimension,
            },
            Case {
                shape: scope.shape_var("s", 0),
                kind: ShapeKind::Fixed,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.shape.kind(), case.kind);
        });
    }

    #[test]
    fn test_kind_recomputed_on_replace() {
        let scope = VarScope::new();
        let shape = RankedShape::new([Dimension::from(2), Dimension::from(3)]);
        assert_eq!(shape.kind(), ShapeKind::Fixed);

        let dynamic = shape.with_dim(1, scope.dim_var("n")).unwrap();
        assert_eq!(dynamic.kind(), ShapeKind::HasUnknownDimension);
        assert_eq!(shape.kind(), ShapeKind::Fixed);

        let fixed = dynamic.with_dim(1, 4.into()).unwrap();
        assert_eq!(fixed.kind(), ShapeKind::Fixed);

        assert_eq!(
            shape.with_dim(2, 1.into()),
            Err(ShapeError::IndexOutOfRange { index: 2, rank: 2 })
        );
    }

    #[test]
    fn test_rank() {
        let scope = VarScope::new();
        assert_eq!(Shape::from([1, 2, 3]).rank(), Ok(3));
        assert_eq!(scope.shape_var("s", 5).rank(), Ok(5));

        let err = Shape::invalid().rank().err().unwrap();
        assert_eq!(
            err,
            ShapeError::InvalidOperation {
                op: "rank",
                shape: "[invalid]".to_string()
            }
        );
        assert!(Shape::unranked().rank().is_err());
    }

    #[test]
    fn test_dim() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");
        let shape = Shape::from(vec![n.clone(), 3.into(), 224.into()]);

        assert_eq!(shape.dim(0), Ok(n));
        assert_eq!(shape.dim(-1), Ok(Dimension::from(224)));
        assert_eq!(
            shape.dim(3),
            Err(ShapeError::IndexOutOfRange { index: 3, rank: 3 })
        );
        assert!(Shape::invalid().dim(0).is_err());

        let s = scope.shape_var("s", 2);
        let d = s.dim(-1).unwrap();
        assert_eq!(d.to_string(), "s[1]");
    }

    #[test]
    fn test_dim_index_beyond_isize() {
        let scope = VarScope::new();
        let shapes = [Shape::from([2, 4, 8]), scope.shape_var("s", 3)];

        for shape in shapes {
            for index in [i64::MAX, i64::MIN, 1 << 32, (1 << 32) + 1, -(1 << 32) - 1] {
                assert_eq!(
                    shape.dim_at(&index.into()),
                    Err(ShapeError::IndexOutOfRange { index, rank: 3 }),
                    "{shape} at {index}"
                );
            }
        }
        assert_eq!(Shape::from([2, 4, 8]).dim_at(&(-3).into()), Ok(Dimension::from(2)));
    }

    #[test]
    fn test_dim_at() {
        let scope = VarScope::new();
        let shape = Shape::from([2, 4, 8]);
        let i = scope.bounded_dim_var("i", ValueRange::new(0., 2.));

        assert_eq!(shape.dim_at(&1.into()), Ok(Dimension::from(4)));

        let at = shape.dim_at(&i).unwrap();
        assert!(matches!(at.expr(), Some(DimExpr::At { .. })));
        assert_eq!(at.range(), ValueRange::new(2., 8.));
        assert_eq!(at.to_string(), "[2,4,8][i]");

        assert!(Shape::invalid().dim_at(&i).is_err());
        assert!(Shape::unranked().dim_at(&i).is_err());
    }

    #[test]
    fn test_equality_and_hash() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");

        let a = Shape::from(vec![&n * 2, 3.into()]);
        let b = Shape::from(vec![&n * 2, 3.into()]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = Shape::from(vec![&n * 3, 3.into()]);
        assert_ne!(a, c);

        // Same name, different variable.
        let n2 = scope.dim_var("n");
        assert_ne!(Shape::from(vec![n.clone()]), Shape::from(vec![n2]));
    }

    #[test]
    fn test_display() {
        let scope = VarScope::new();
        let expr = ExprRef::new(TypedValue {
            name: "conv1",
            shape: None,
        });

        assert_eq!(Shape::from([1, 3, 224, 224]).to_string(), "[1,3,224,224]");
        assert_eq!(Shape::scalar().to_string(), "[]");
        assert_eq!(Shape::invalid().to_string(), "[invalid]");
        assert_eq!(Shape::unranked().to_string(), "[*]");
        assert_eq!(scope.shape_var("s", 2).to_string(), "s");
        assert_eq!(Shape::of(expr).to_string(), "shape_of(conv1)");
        assert_eq!(
            Shape::from(vec![scope.dim_var("n"), Dimension::Unknown]).to_string(),
            "[n,?]"
        );
    }

    #[test]
    fn test_shape_of() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");
        let typed = ExprRef::new(TypedValue {
            name: "x",
            shape: Some(Shape::from(vec![n.clone(), 16.into()])),
        });
        let untyped = ExprRef::new(TypedValue {
            name: "y",
            shape: None,
        });

        let shape = Shape::of(typed.clone());
        assert_eq!(shape.kind(), ShapeKind::HasUnknownDimension);
        assert_eq!(shape.rank(), Ok(2));
        assert_eq!(shape.dim(0), Ok(n));
        assert_eq!(
            shape.to_value_array_expr(),
            Ok(ValueArrayExpr::ShapeOf(typed))
        );

        let shape = Shape::of(untyped);
        assert_eq!(shape.kind(), ShapeKind::Unranked);
        assert!(shape.rank().is_err());
    }

    #[test]
    fn test_to_value_array() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");

        assert_eq!(Shape::from([1, 2, 3]).to_value_array(), Ok(vec![1, 2, 3]));
        assert_eq!(
            Shape::from(vec![n.clone()]).to_value_array(),
            Err(ShapeError::NotFixed("[n]".to_string()))
        );
        assert!(Shape::invalid().to_value_array().is_err());
    }

    #[test]
    fn test_to_value_array_expr() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");
        let s = scope.new_shape_var("s", 2);
        let expr = ExprRef::new(TypedValue {
            name: "reshape_target",
            shape: None,
        });

        assert_eq!(
            Shape::from([2, 3]).to_value_array_expr(),
            Ok(ValueArrayExpr::Const(vec![2, 3]))
        );
        assert_eq!(
            Shape::from(vec![n.clone(), 3.into()]).to_value_array_expr(),
            Ok(ValueArrayExpr::Stack(vec![n, 3.into()]))
        );
        assert_eq!(
            Shape::Var(s.clone()).to_value_array_expr(),
            Ok(ValueArrayExpr::Var(s))
        );
        assert_eq!(
            Shape::unranked_of(expr.clone()).to_value_array_expr(),
            Ok(ValueArrayExpr::Expr(expr))
        );
        assert!(Shape::unranked().to_value_array_expr().is_err());
        assert!(Shape::invalid().to_value_array_expr().is_err());
    }

    #[test]
    fn test_is_assignable_from() {
        let scope = VarScope::new();
        let n = scope.bounded_dim_var("n", ValueRange::new(1., 64.));
        let m = scope.dim_var("m");

        #[derive(Debug)]
        struct Case {
            target: Shape,
            value: Shape,
            expected: bool,
        }

        let cases = [
            Case {
                target: Shape::from(vec![Dimension::Unknown, 3.into()]),
                value: Shape::from([8, 3]),
                expected: true,
            },
            Case {
                target: Shape::from(vec![n.clone(), 3.into()]),
                value: Shape::from([8, 3]),
                expected: true,
            },
            Case {
                target: Shape::from(vec![n.clone(), 3.into()]),
                value: Shape::from([100, 3]),
                expected: false,
            },
            Case {
                target: Shape::from(vec![n.clone()]),
                value: Shape::from(vec![m.clone()]),
                expected: false,
            },
            Case {
                target: Shape::from(vec![n.clone()]),
                value: Shape::from(vec![n.clone()]),
                expected: true,
            },
            Case {
                target: Shape::from([8, 3]),
                value: Shape::from(vec![n.clone(), 3.into()]),
                expected: false,
            },
            Case {
                target: Shape::from([8, 3]),
                value: Shape::from([8]),
                expected: false,
            },
            Case {
                target: Shape::unranked(),
                value: Shape::from([1, 2]),
                expected: true,
            },
            Case {
                target: Shape::from([1, 2]),
                value: Shape::unranked(),
                expected: false,
            },
            Case {
                target: Shape::unranked(),
                value: Shape::invalid(),
                expected: false,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.target.is_assignable_from(&case.value), case.expected);
        });
    }

    #[test]
    fn test_prod() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");

        assert_eq!(Shape::from([2, 3, 4]).prod(), Ok(Dimension::from(24)));
        assert_eq!(Shape::scalar().prod(), Ok(Dimension::from(1)));

        let shape = Shape::from(vec![n.clone(), 3.into(), n.clone()]);
        assert_eq!(shape.prod().unwrap().to_string(), "(pow(n, 2) * 3)");
        assert!(Shape::unranked().prod().is_err());
    }

    #[test]
    fn test_insert_and_clone() {
        let shape = Shape::from([3, 4]);
        assert_eq!(
            shape.insert_and_clone(0, 1.into()),
            Ok(Shape::from([1, 3, 4]))
        );
        assert_eq!(
            shape.insert_and_clone(2, 1.into()),
            Ok(Shape::from([3, 4, 1]))
        );
        assert!(shape.insert_and_clone(3, 1.into()).is_err());
        assert_eq!(shape, Shape::from([3, 4]));
    }

    #[test]
    fn test_elementwise_ops() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");
        let shape = Shape::from(vec![n.clone(), 3.into(), 224.into(), 224.into()]);

        let scaled = (&shape * &Shape::from([1, 1, 2, 2])).simplify().unwrap();
        assert_eq!(scaled.to_string(), "[n,3,448,448]");

        let halved = shape.checked_div_dim(&2.into()).unwrap();
        assert_eq!(halved.dim(-1), Ok(Dimension::from(112)));

        let plus = shape.checked_add(&Shape::from([0, 1, 0, 0])).unwrap();
        assert_eq!(plus.dim(1), Ok(Dimension::from(4)));

        assert_eq!(
            shape.checked_mul(&Shape::from([1, 2])),
            Err(ShapeError::RankMismatch {
                lhs: "[n,3,224,224]".to_string(),
                rhs: "[1,2]".to_string(),
            })
        );
        assert!(matches!(
            shape.checked_rem(&Shape::from([1, 0, 1, 1])),
            Err(ShapeError::Dim(DimError::DivideByZero(_)))
        ));
        assert!(Shape::invalid().checked_add(&shape).is_err());
    }

    #[test]
    fn test_broadcast() {
        let scope = VarScope::new();
        let n = scope.dim_var("n");

        assert_eq!(
            Shape::from([3, 1, 5]).broadcast(&Shape::from([4, 1])),
            Ok(Shape::from([3, 4, 5]))
        );
        assert_eq!(
            Shape::from(vec![n.clone(), 1.into()]).broadcast(&Shape::from([8])),
            Ok(Shape::from(vec![n.clone(), 8.into()]))
        );
        assert!(matches!(
            Shape::from([2]).broadcast(&Shape::from([3])),
            Err(ShapeError::Incompatible { .. })
        ));
        assert_eq!(
            Shape::unranked().broadcast(&Shape::from([3])),
            Ok(Shape::unranked())
        );
    }

    #[test]
    fn test_shape_var_dims() {
        let scope = VarScope::new();
        let s = scope.shape_var("s", 2);
        let dims = s.to_dims().unwrap();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].to_string(), "s[0]");
        assert!(s.is_assignable_from(&s));
    }
}
