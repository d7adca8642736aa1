//! Arithmetic on dimensions.
//!
//! Every operation here tries, in order:
//!
//! 1. Folding fixed operands into a fixed result
//! 2. Returning the other operand if one operand is an identity
//! 3. Propagating [`Dimension::Unknown`]
//! 4. Building an expression node
//!
//! No deeper canonicalization happens at construction time. That is the job
//! of [`Dimension::simplify`].

use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Rem, Sub};

use smallvec::{SmallVec, smallvec};

use crate::dim::{DimExpr, DimList, DivMode, Dimension};
use crate::errors::DimError;

/// Integer division rounding towards negative infinity.
pub(crate) fn div_floor(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        quotient.wrapping_sub(1)
    } else {
        quotient
    }
}

/// Integer division rounding towards positive infinity.
pub(crate) fn div_ceil(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) == (rhs < 0)) {
        quotient.wrapping_add(1)
    } else {
        quotient
    }
}

/// Remainder of [`div_floor`]. The result has the sign of `rhs`.
pub(crate) fn rem_floor(lhs: i64, rhs: i64) -> i64 {
    let rem = lhs.wrapping_rem(rhs);
    if rem != 0 && ((rem < 0) != (rhs < 0)) {
        rem.wrapping_add(rhs)
    } else {
        rem
    }
}

pub(crate) fn div_fixed(lhs: i64, rhs: i64, mode: DivMode) -> i64 {
    match mode {
        DivMode::Floor => div_floor(lhs, rhs),
        DivMode::Ceil => div_ceil(lhs, rhs),
    }
}

/// Normalize a possibly negative index into `[0, extent)`, clamping indices
/// that are out of range.
pub(crate) fn positive_fixed(index: i64, extent: i64) -> i64 {
    let index = if index < 0 {
        index.wrapping_add(extent)
    } else {
        index
    };
    index.max(0).min(extent.saturating_sub(1).max(0))
}

fn add_dims(lhs: &Dimension, rhs: &Dimension) -> Dimension {
    use Dimension::{Fixed, Unknown};

    match (lhs, rhs) {
        (Fixed(a), Fixed(b)) => Fixed(a.wrapping_add(*b)),
        (Fixed(0), other) | (other, Fixed(0)) => other.clone(),
        (Unknown, _) | (_, Unknown) => Unknown,
        (Fixed(bias), other) | (other, Fixed(bias)) => DimExpr::Sum {
            operands: smallvec![other.clone()],
            bias: *bias,
        }
        .into(),
        _ => DimExpr::Sum {
            operands: smallvec![lhs.clone(), rhs.clone()],
            bias: 0,
        }
        .into(),
    }
}

fn neg_dim(dim: &Dimension) -> Dimension {
    match dim {
        Dimension::Fixed(value) => Dimension::Fixed(value.wrapping_neg()),
        Dimension::Unknown => Dimension::Unknown,
        Dimension::Dynamic(_) => DimExpr::Product {
            operands: smallvec![dim.clone()],
            scale: -1,
        }
        .into(),
    }
}

fn sub_dims(lhs: &Dimension, rhs: &Dimension) -> Dimension {
    use Dimension::{Fixed, Unknown};

    match (lhs, rhs) {
        (Fixed(a), Fixed(b)) => Fixed(a.wrapping_sub(*b)),
        (_, Fixed(0)) => lhs.clone(),
        (Unknown, _) | (_, Unknown) => Unknown,
        _ => add_dims(lhs, &neg_dim(rhs)),
    }
}

fn mul_dims(lhs: &Dimension, rhs: &Dimension) -> Dimension {
    use Dimension::{Fixed, Unknown};

    match (lhs, rhs) {
        (Fixed(a), Fixed(b)) => Fixed(a.wrapping_mul(*b)),
        (Fixed(1), other) | (other, Fixed(1)) => other.clone(),
        (Unknown, _) | (_, Unknown) => Unknown,
        (Fixed(0), _) | (_, Fixed(0)) => Fixed(0),
        (Fixed(scale), other) | (other, Fixed(scale)) => DimExpr::Product {
            operands: smallvec![other.clone()],
            scale: *scale,
        }
        .into(),
        _ => DimExpr::Product {
            operands: smallvec![lhs.clone(), rhs.clone()],
            scale: 1,
        }
        .into(),
    }
}

impl Dimension {
    fn checked_div_mode(&self, rhs: &Dimension, mode: DivMode) -> Result<Dimension, DimError> {
        use Dimension::{Fixed, Unknown};

        let sym = match mode {
            DivMode::Floor => "/",
            DivMode::Ceil => "ceil_div",
        };
        match (self, rhs) {
            (_, Fixed(0)) => Err(DimError::DivideByZero(format!("{self} {sym} {rhs}"))),
            (Fixed(a), Fixed(b)) => Ok(Fixed(div_fixed(*a, *b, mode))),
            (_, Fixed(1)) => Ok(self.clone()),
            (Unknown, _) | (_, Unknown) => Ok(Unknown),
            _ => Ok(DimExpr::Fraction {
                numerator: self.clone(),
                denominator: rhs.clone(),
                mode,
            }
            .into()),
        }
    }

    /// Divide `self` by `rhs`, rounding towards negative infinity.
    ///
    /// Returns an error if `rhs` is the fixed value zero.
    pub fn checked_div(&self, rhs: &Dimension) -> Result<Dimension, DimError> {
        self.checked_div_mode(rhs, DivMode::Floor)
    }

    /// Divide `self` by `rhs`, rounding towards positive infinity.
    pub fn checked_div_ceil(&self, rhs: &Dimension) -> Result<Dimension, DimError> {
        self.checked_div_mode(rhs, DivMode::Ceil)
    }

    /// Panicking version of [`checked_div_ceil`](Dimension::checked_div_ceil).
    pub fn div_ceil(&self, rhs: &Dimension) -> Dimension {
        self.checked_div_ceil(rhs)
            .unwrap_or_else(|err| panic!("{}", err))
    }

    /// Flooring remainder of `self / rhs`.
    ///
    /// Returns an error if `rhs` is the fixed value zero.
    pub fn checked_rem(&self, rhs: &Dimension) -> Result<Dimension, DimError> {
        use Dimension::{Fixed, Unknown};

        match (self, rhs) {
            (_, Fixed(0)) => Err(DimError::DivideByZero(format!("{self} % {rhs}"))),
            (Fixed(a), Fixed(b)) => Ok(Fixed(rem_floor(*a, *b))),
            (Unknown, _) | (_, Unknown) => Ok(Unknown),
            (_, Fixed(1 | -1)) => Ok(Fixed(0)),
            _ => Ok(DimExpr::Remainder {
                numerator: self.clone(),
                denominator: rhs.clone(),
            }
            .into()),
        }
    }

    /// Raise `self` to the power `power`.
    pub fn pow(&self, power: u32) -> Dimension {
        match self {
            Self::Fixed(value) => Self::Fixed(value.wrapping_pow(power)),
            Self::Unknown => Self::Unknown,
            Self::Dynamic(_) => match power {
                0 => Self::Fixed(1),
                1 => self.clone(),
                _ => DimExpr::Power {
                    base: self.clone(),
                    power,
                }
                .into(),
            },
        }
    }

    /// Absolute value of `self`.
    ///
    /// Returns `self` unchanged if its range shows it is never negative.
    pub fn abs(&self) -> Dimension {
        match self {
            Self::Fixed(value) => Self::Fixed(value.wrapping_abs()),
            Self::Unknown => Self::Unknown,
            Self::Dynamic(_) if self.is_provably_non_negative() => self.clone(),
            Self::Dynamic(_) => DimExpr::Abs(self.clone()).into(),
        }
    }

    /// Minimum of `self` and `other`.
    pub fn min(&self, other: &Dimension) -> Dimension {
        Self::min_of([self.clone(), other.clone()])
    }

    /// Maximum of `self` and `other`.
    pub fn max(&self, other: &Dimension) -> Dimension {
        Self::max_of([self.clone(), other.clone()])
    }

    /// Minimum of a list of dimensions.
    ///
    /// Returns [`Dimension::Unknown`] if the list is empty or contains an
    /// unknown dimension.
    pub fn min_of(operands: impl IntoIterator<Item = Dimension>) -> Dimension {
        reduce_extremum(operands, i64::min, DimExpr::Min)
    }

    /// Maximum of a list of dimensions.
    ///
    /// Returns [`Dimension::Unknown`] if the list is empty or contains an
    /// unknown dimension.
    pub fn max_of(operands: impl IntoIterator<Item = Dimension>) -> Dimension {
        reduce_extremum(operands, i64::max, DimExpr::Max)
    }

    /// Clamp `self` to `[min, max]`.
    ///
    /// This is evaluated as `min(max(self, min), max)`, so `max` wins if the
    /// bounds cross.
    pub fn clamp(&self, min: &Dimension, max: &Dimension) -> Dimension {
        if self.is_unknown() || min.is_unknown() || max.is_unknown() {
            return Self::Unknown;
        }
        if let (Some(x), Some(lo), Some(hi)) = (self.as_fixed(), min.as_fixed(), max.as_fixed()) {
            return Self::Fixed(x.max(lo).min(hi));
        }

        let range = self.range();
        if range.min() >= min.range().max() && range.max() <= max.range().min() {
            return self.clone();
        }

        DimExpr::Clamp {
            operand: self.clone(),
            min: min.clone(),
            max: max.clone(),
        }
        .into()
    }

    /// Return `true_value` if `value == expected`, or `false_value` otherwise.
    pub fn select(
        value: &Dimension,
        expected: &Dimension,
        true_value: &Dimension,
        false_value: &Dimension,
    ) -> Dimension {
        if let (Some(value), Some(expected)) = (value.as_fixed(), expected.as_fixed()) {
            return if value == expected {
                true_value.clone()
            } else {
                false_value.clone()
            };
        }
        if true_value == false_value {
            return true_value.clone();
        }
        if value.is_unknown() || expected.is_unknown() {
            return Self::Unknown;
        }
        if value.range().is_disjoint(&expected.range()) {
            return false_value.clone();
        }
        if value == expected {
            return true_value.clone();
        }

        DimExpr::CompareAndSelect {
            value: value.clone(),
            expected: expected.clone(),
            true_value: true_value.clone(),
            false_value: false_value.clone(),
        }
        .into()
    }

    /// Normalize a possibly negative `index` into the range `[0, extent)`.
    ///
    /// Negative indices count back from `extent`. Indices that remain out of
    /// range are clamped.
    pub fn positive(index: &Dimension, extent: &Dimension) -> Dimension {
        use Dimension::{Fixed, Unknown};

        match (index, extent) {
            (Fixed(index), Fixed(extent)) => return Fixed(positive_fixed(*index, *extent)),
            (Unknown, _) | (_, Unknown) => return Unknown,
            _ => {}
        }

        let index_range = index.range();
        let min_extent = extent.range().min();
        if min_extent > 0. {
            if index_range.min() >= 0. && index_range.max() <= min_extent - 1. {
                return index.clone();
            }
            if index_range.min() >= -min_extent && index_range.max() <= -1. {
                return add_dims(index, extent);
            }
        }

        DimExpr::Positive {
            index: index.clone(),
            extent: extent.clone(),
        }
        .into()
    }
}

/// Shared implementation of [`Dimension::min_of`] and [`Dimension::max_of`].
fn reduce_extremum(
    operands: impl IntoIterator<Item = Dimension>,
    fold: fn(i64, i64) -> i64,
    make_node: fn(DimList) -> DimExpr,
) -> Dimension {
    let mut constant: Option<i64> = None;
    let mut dynamic: DimList = SmallVec::new();
    let mut any = false;

    for op in operands {
        any = true;
        match op {
            Dimension::Unknown => return Dimension::Unknown,
            Dimension::Fixed(value) => {
                constant = Some(constant.map_or(value, |c| fold(c, value)));
            }
            Dimension::Dynamic(_) => {
                if !dynamic.contains(&op) {
                    dynamic.push(op);
                }
            }
        }
    }

    if !any {
        return Dimension::Unknown;
    }

    let mut list: DimList = SmallVec::new();
    if let Some(c) = constant {
        list.push(Dimension::Fixed(c));
    }
    list.extend(dynamic);

    if list.len() == 1 {
        return list.remove(0);
    }
    make_node(list).into()
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:ident) => {
        impl $trait<Dimension> for Dimension {
            type Output = Dimension;

            fn $method(self, rhs: Dimension) -> Dimension {
                $op(&self, &rhs)
            }
        }

        impl $trait<&Dimension> for Dimension {
            type Output = Dimension;

            fn $method(self, rhs: &Dimension) -> Dimension {
                $op(&self, rhs)
            }
        }

        impl $trait<Dimension> for &Dimension {
            type Output = Dimension;

            fn $method(self, rhs: Dimension) -> Dimension {
                $op(self, &rhs)
            }
        }

        impl $trait<&Dimension> for &Dimension {
            type Output = Dimension;

            fn $method(self, rhs: &Dimension) -> Dimension {
                $op(self, rhs)
            }
        }

        impl $trait<i64> for Dimension {
            type Output = Dimension;

            fn $method(self, rhs: i64) -> Dimension {
                $op(&self, &Dimension::Fixed(rhs))
            }
        }

        impl $trait<i64> for &Dimension {
            type Output = Dimension;

            fn $method(self, rhs: i64) -> Dimension {
                $op(self, &Dimension::Fixed(rhs))
            }
        }
    };
}

fn div_or_panic(lhs: &Dimension, rhs: &Dimension) -> Dimension {
    lhs.checked_div(rhs).unwrap_or_else(|err| panic!("{}", err))
}

fn rem_or_panic(lhs: &Dimension, rhs: &Dimension) -> Dimension {
    lhs.checked_rem(rhs).unwrap_or_else(|err| panic!("{}", err))
}

impl_binary_op!(Add, add, add_dims);
impl_binary_op!(Sub, sub, sub_dims);
impl_binary_op!(Mul, mul, mul_dims);

// Like integer division, these panic if the divisor is zero. Use
// `checked_div` and `checked_rem` to handle this case.
impl_binary_op!(Div, div, div_or_panic);
impl_binary_op!(Rem, rem, rem_or_panic);

impl Neg for Dimension {
    type Output = Dimension;

    fn neg(self) -> Dimension {
        neg_dim(&self)
    }
}

impl Neg for &Dimension {
    type Output = Dimension;

    fn neg(self) -> Dimension {
        neg_dim(self)
    }
}

impl AddAssign<Dimension> for Dimension {
    fn add_assign(&mut self, rhs: Dimension) {
        *self = add_dims(self, &rhs);
    }
}

impl MulAssign<Dimension> for Dimension {
    fn mul_assign(&mut self, rhs: Dimension) {
        *self = mul_dims(self, &rhs);
    }
}

impl Sum for Dimension {
    fn sum<I: Iterator<Item = Dimension>>(iter: I) -> Dimension {
        iter.fold(Dimension::Fixed(0), |acc, x| add_dims(&acc, &x))
    }
}

impl Product for Dimension {
    fn product<I: Iterator<Item = Dimension>>(iter: I) -> Dimension {
        iter.fold(Dimension::Fixed(1), |acc, x| mul_dims(&acc, &x))
    }
}
