//! Closed intervals used to bound the values of dimension expressions.

use std::fmt;

use crate::dim::DivMode;

/// Magnitude at which a bound no longer fits in an `i64`. This is `2^63`,
/// which is also what `i64::MAX` rounds to as an `f64`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Return true if `x` is a usable lower bound.
fn is_lower_bound(x: f64) -> bool {
    x == f64::NEG_INFINITY || (x > -I64_LIMIT && x < I64_LIMIT)
}

/// Return true if `x` is a usable upper bound.
fn is_upper_bound(x: f64) -> bool {
    x == f64::INFINITY || (x > -I64_LIMIT && x < I64_LIMIT)
}

/// Closed interval `[min, max]` of the values an expression may take.
///
/// Bounds are stored as `f64` so that the unbounded interval can be
/// represented with infinities. The [`full`](ValueRange::full) range is used
/// when nothing is known about a value.
///
/// Arithmetic on dimensions wraps on overflow, so a computed range with a
/// finite bound at or beyond the limits of `i64` is widened to the full
/// range. An infinite bound means "unbounded" and is kept.
#[derive(Clone, Copy, PartialEq)]
pub struct ValueRange {
    min: f64,
    max: f64,
}

impl ValueRange {
    /// Create a range with the given bounds.
    ///
    /// If `min > max`, either bound is NaN or a finite bound does not fit in
    /// an `i64`, the range is widened to [`full`](ValueRange::full).
    pub fn new(min: f64, max: f64) -> Self {
        if min.is_nan() || max.is_nan() || min > max {
            return Self::full();
        }
        if !is_lower_bound(min) || !is_upper_bound(max) {
            return Self::full();
        }
        Self { min, max }
    }

    /// Range containing every value.
    pub const fn full() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Range containing only `value`.
    pub fn point(value: i64) -> Self {
        Self {
            min: value as f64,
            max: value as f64,
        }
    }

    /// Range of values `>= 0`.
    pub const fn non_negative() -> Self {
        Self {
            min: 0.,
            max: f64::INFINITY,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.min == f64::NEG_INFINITY && self.max == f64::INFINITY
    }

    /// Return the single value in this range, if `min == max`.
    pub fn as_point(&self) -> Option<i64> {
        (self.min == self.max && self.min.is_finite()).then_some(self.min as i64)
    }

    pub fn contains(&self, value: i64) -> bool {
        let value = value as f64;
        self.min <= value && value <= self.max
    }

    /// Return true if every value in `other` is also in `self`.
    pub fn contains_range(&self, other: &ValueRange) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// Return true if no value is in both `self` and `other`.
    pub fn is_disjoint(&self, other: &ValueRange) -> bool {
        self.max < other.min || other.max < self.min
    }

    /// Return true if all values in the range are `>= 0`.
    pub fn is_non_negative(&self) -> bool {
        self.min >= 0.
    }

    /// Return true if all values in the range are `> 0`.
    pub fn is_positive(&self) -> bool {
        self.min > 0.
    }

    /// Smallest range containing both `self` and `other`.
    pub fn union(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Values that are in both `self` and `other`, or `None` if the ranges
    /// are disjoint.
    pub fn intersect(&self, other: &ValueRange) -> Option<ValueRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(ValueRange { min, max })
    }

    pub fn add(&self, other: &ValueRange) -> ValueRange {
        ValueRange::new(self.min + other.min, self.max + other.max)
    }

    /// Range of `-self`. Negating `i64::MIN` wraps, so a range reaching it
    /// becomes full.
    pub fn neg(&self) -> ValueRange {
        ValueRange::new(-self.max, -self.min)
    }

    /// Range of `self * other`.
    pub fn mul(&self, other: &ValueRange) -> ValueRange {
        from_corners(self, other, mul_bound)
    }

    /// Range of `self * scale`.
    pub fn scale(&self, scale: i64) -> ValueRange {
        self.mul(&ValueRange::point(scale))
    }

    /// Range of `self / other` rounded according to `mode`.
    ///
    /// Returns the full range if `other` may be zero.
    pub fn div(&self, other: &ValueRange, mode: DivMode) -> ValueRange {
        if other.contains(0) {
            return ValueRange::full();
        }
        let round = match mode {
            DivMode::Floor => f64::floor,
            DivMode::Ceil => f64::ceil,
        };
        from_corners(self, other, |x, y| round(x / y))
    }

    /// Range of the flooring remainder `self % other`.
    ///
    /// The result has the sign of the divisor and a magnitude smaller than
    /// the divisor's.
    pub fn rem(&self, other: &ValueRange) -> ValueRange {
        if other.is_positive() {
            let mut max = other.max - 1.;
            if self.is_non_negative() {
                if self.max < other.min {
                    return *self;
                }
                max = max.min(self.max);
            }
            ValueRange::new(0., max)
        } else if other.max < 0. {
            let mut min = other.min + 1.;
            if self.max <= 0. {
                if self.min > other.max {
                    return *self;
                }
                min = min.max(self.min);
            }
            ValueRange::new(min, 0.)
        } else {
            let bound = other.min.abs().max(other.max.abs()) - 1.;
            ValueRange::new(-bound, bound)
        }
    }

    /// Range of `self` raised to the non-negative integer power `power`.
    pub fn pow(&self, power: u32) -> ValueRange {
        if power == 0 {
            return ValueRange::point(1);
        }
        let Ok(exp) = i32::try_from(power) else {
            return ValueRange::full();
        };
        let lo = self.min.powi(exp);
        let hi = self.max.powi(exp);
        if power % 2 == 1 || self.min >= 0. {
            ValueRange::new(lo, hi)
        } else if self.max <= 0. {
            ValueRange::new(hi, lo)
        } else {
            ValueRange::new(0., lo.max(hi))
        }
    }

    pub fn abs(&self) -> ValueRange {
        if self.min >= 0. {
            *self
        } else if self.max <= 0. {
            self.neg()
        } else {
            ValueRange::new(0., self.max.max(-self.min))
        }
    }

    /// Range of `min(self, other)`.
    pub fn min_with(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            min: self.min.min(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Range of `max(self, other)`.
    pub fn max_with(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            min: self.min.max(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Range of `min(max(self, lo), hi)`.
    pub fn clamp(&self, lo: &ValueRange, hi: &ValueRange) -> ValueRange {
        self.max_with(lo).min_with(hi)
    }
}

/// Product of two interval bounds where `0 * inf` is treated as zero.
fn mul_bound(x: f64, y: f64) -> f64 {
    if x == 0. || y == 0. { 0. } else { x * y }
}

/// Evaluate `op` at the four corners of `lhs x rhs` and return the smallest
/// range containing the results.
///
/// This is exact for operations which are monotonic in each argument over
/// the ranges, such as multiplication or division by a non-zero range.
fn from_corners(lhs: &ValueRange, rhs: &ValueRange, op: impl Fn(f64, f64) -> f64) -> ValueRange {
    let corners = [
        op(lhs.min, rhs.min),
        op(lhs.min, rhs.max),
        op(lhs.max, rhs.min),
        op(lhs.max, rhs.max),
    ];
    if corners.iter().any(|c| c.is_nan()) {
        return ValueRange::full();
    }
    let min = corners.iter().copied().fold(f64::INFINITY, f64::min);
    let max = corners.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ValueRange::new(min, max)
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Debug for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
