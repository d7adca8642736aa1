//! Canonicalization of dimension expressions.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::dim::{DimExpr, DimList, DivMode, Dimension};
use crate::dim_ops::{div_fixed, rem_floor};
use crate::env::{env_flag, env_usize};
use crate::errors::DimError;
use crate::factor::{Factors, bias_and_terms, gcd, scale_and_pows};
use crate::shape::Shape;

/// How operands of sums and products are matched when combining like terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperandKeys {
    /// Structurally equal operands are combined.
    #[default]
    Structural,
    /// Operands are combined only if they are the same node. Separately
    /// constructed but structurally equal sub-expressions are kept apart.
    Identity,
}

/// Options that control [`Dimension::simplify_with`].
#[derive(Clone, Debug, PartialEq)]
pub struct SimplifyOptions {
    /// How like terms and factors are matched.
    pub operand_keys: OperandKeys,

    /// Maximum number of nested remainder reductions performed for a single
    /// remainder node. When the limit is reached the remainder is left
    /// partially simplified.
    pub max_rem_depth: usize,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        SimplifyOptions {
            operand_keys: OperandKeys::Structural,
            max_rem_depth: 8,
        }
    }
}

impl SimplifyOptions {
    /// Read options from environment variables, using defaults for those
    /// that are not set.
    ///
    /// - `RTEN_DIMS_IDENTITY_KEYS` - Combine operands by identity instead of
    ///   structure
    /// - `RTEN_DIMS_REM_DEPTH` - Sets [`max_rem_depth`](Self::max_rem_depth)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let operand_keys = if env_flag("RTEN_DIMS_IDENTITY_KEYS", false) {
            OperandKeys::Identity
        } else {
            OperandKeys::Structural
        };
        SimplifyOptions {
            operand_keys,
            max_rem_depth: env_usize("RTEN_DIMS_REM_DEPTH", defaults.max_rem_depth),
        }
    }
}

impl Dimension {
    /// Rewrite this dimension into canonical form using default options.
    ///
    /// Constants are folded, like terms and factors are combined, common
    /// factors are cancelled from fractions and remainders, and nodes whose
    /// value is determined by their operands' ranges are collapsed.
    ///
    /// Returns an error if a division or remainder by zero is found.
    pub fn simplify(&self) -> Result<Dimension, DimError> {
        self.simplify_with(&SimplifyOptions::default())
    }

    /// Variant of [`simplify`](Dimension::simplify) with explicit options.
    pub fn simplify_with(&self, opts: &SimplifyOptions) -> Result<Dimension, DimError> {
        Simplifier::new(opts).simplify(self)
    }
}

impl Shape {
    /// Simplify every dimension of this shape.
    pub fn simplify(&self) -> Result<Shape, DimError> {
        self.simplify_with(&SimplifyOptions::default())
    }

    pub fn simplify_with(&self, opts: &SimplifyOptions) -> Result<Shape, DimError> {
        Simplifier::new(opts).simplify_shape(self)
    }
}

struct Simplifier<'a> {
    opts: &'a SimplifyOptions,

    /// Results for nodes that have already been simplified, keyed by node
    /// address. The input node is stored alongside the result so that its
    /// address stays valid.
    cache: RefCell<FxHashMap<usize, (Dimension, Dimension)>>,
}

impl<'a> Simplifier<'a> {
    fn new(opts: &'a SimplifyOptions) -> Self {
        Simplifier {
            opts,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    fn keys(&self) -> OperandKeys {
        self.opts.operand_keys
    }

    fn simplify_shape(&self, shape: &Shape) -> Result<Shape, DimError> {
        match shape {
            Shape::Ranked(ranked) => {
                let dims = ranked
                    .dims()
                    .iter()
                    .map(|d| self.simplify(d))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Shape::Ranked(ranked.with_dims(dims)))
            }
            _ => Ok(shape.clone()),
        }
    }

    fn simplify_all(&self, operands: &[Dimension]) -> Result<DimList, DimError> {
        operands.iter().map(|op| self.simplify(op)).collect()
    }

    fn simplify(&self, dim: &Dimension) -> Result<Dimension, DimError> {
        let Dimension::Dynamic(node) = dim else {
            return Ok(dim.clone());
        };
        if let Some((_, result)) = self.cache.borrow().get(&node.addr()) {
            return Ok(result.clone());
        }

        let simplified = match node.expr() {
            DimExpr::Var(_) => dim.clone(),
            DimExpr::Expr(expr) => Dimension::from_ir_expr(expr.clone()),
            DimExpr::Product { operands, scale } => {
                let operands = self.simplify_all(operands)?;
                self.simplify_product(*scale, &operands)
            }
            DimExpr::Sum { operands, bias } => {
                let operands = self.simplify_all(operands)?;
                self.simplify_sum(*bias, &operands)
            }
            DimExpr::Fraction {
                numerator,
                denominator,
                mode,
            } => {
                let numerator = self.simplify(numerator)?;
                let denominator = self.simplify(denominator)?;
                self.simplify_fraction(&numerator, &denominator, *mode)?
            }
            DimExpr::Remainder {
                numerator,
                denominator,
            } => {
                let numerator = self.simplify(numerator)?;
                let denominator = self.simplify(denominator)?;
                self.simplify_rem(&numerator, &denominator, 0)?
            }
            DimExpr::Power { base, power } => {
                let base = self.simplify(base)?;
                simplify_power(&base, *power)
            }
            DimExpr::Abs(operand) => self.simplify(operand)?.abs(),
            DimExpr::Clamp { operand, min, max } => {
                let operand = self.simplify(operand)?;
                let min = self.simplify(min)?;
                let max = self.simplify(max)?;
                operand.clamp(&min, &max)
            }
            DimExpr::CompareAndSelect {
                value,
                expected,
                true_value,
                false_value,
            } => Dimension::select(
                &self.simplify(value)?,
                &self.simplify(expected)?,
                &self.simplify(true_value)?,
                &self.simplify(false_value)?,
            ),
            DimExpr::Min(operands) => {
                let operands = self.simplify_all(operands)?;
                simplify_extremum(&operands, false)
            }
            DimExpr::Max(operands) => {
                let operands = self.simplify_all(operands)?;
                simplify_extremum(&operands, true)
            }
            DimExpr::Positive { index, extent } => {
                Dimension::positive(&self.simplify(index)?, &self.simplify(extent)?)
            }
            DimExpr::At { shape, index } => {
                let shape = self.simplify_shape(shape)?;
                let index = self.simplify(index)?;
                self.simplify_at(shape, index)?
            }
        };

        // Keep the original node if nothing changed, so that shared
        // sub-expressions stay shared.
        let simplified = if simplified == *dim {
            dim.clone()
        } else {
            simplified
        };
        self.cache
            .borrow_mut()
            .insert(node.addr(), (dim.clone(), simplified.clone()));
        Ok(simplified)
    }

    /// Simplify `scale * Π operands`, where operands are already simplified.
    fn simplify_product(&self, scale: i64, operands: &[Dimension]) -> Dimension {
        if operands.iter().any(|op| op.is_unknown()) {
            return Dimension::Unknown;
        }
        let mut factors = scale_and_pows(&Dimension::Fixed(scale), self.keys());
        for op in operands {
            factors.merge(scale_and_pows(op, self.keys()));
        }
        factors.rebuild()
    }

    /// Simplify `bias + Σ operands`, where operands are already simplified.
    fn simplify_sum(&self, bias: i64, operands: &[Dimension]) -> Dimension {
        if operands.iter().any(|op| op.is_unknown()) {
            return Dimension::Unknown;
        }
        let mut terms = bias_and_terms(&Dimension::Fixed(bias), self.keys());
        for op in operands {
            terms.merge(bias_and_terms(op, self.keys()));
        }
        terms.rebuild()
    }

    fn simplify_fraction(
        &self,
        numerator: &Dimension,
        denominator: &Dimension,
        mode: DivMode,
    ) -> Result<Dimension, DimError> {
        use Dimension::{Fixed, Unknown};

        match (numerator, denominator) {
            (_, Fixed(0)) => {
                return Err(DimError::DivideByZero(format!(
                    "{}",
                    Dimension::from(DimExpr::Fraction {
                        numerator: numerator.clone(),
                        denominator: denominator.clone(),
                        mode,
                    })
                )));
            }
            (Unknown, _) | (_, Unknown) => return Ok(Unknown),
            (_, Fixed(1)) => return Ok(numerator.clone()),
            (Fixed(n), Fixed(d)) => return Ok(Fixed(div_fixed(*n, *d, mode))),
            // The divisor is non-zero wherever the expression is defined.
            (Fixed(0), _) => return Ok(Fixed(0)),
            _ => {}
        }

        // (x / a) / b => x / (a * b) for positive constants `a` and `b`.
        if let (
            Some(DimExpr::Fraction {
                numerator: inner_num,
                denominator: Fixed(a),
                mode: inner_mode,
            }),
            Fixed(b),
        ) = (numerator.expr(), denominator)
            && *inner_mode == mode
            && *a > 0
            && *b > 0
            && let Some(ab) = a.checked_mul(*b)
        {
            return self.simplify_fraction(inner_num, &Fixed(ab), mode);
        }

        let num_range = numerator.range();
        let den_range = denominator.range();
        if den_range.is_positive() && num_range.is_non_negative() {
            match mode {
                DivMode::Floor if num_range.max() < den_range.min() => return Ok(Fixed(0)),
                DivMode::Ceil if num_range.min() >= 1. && num_range.max() <= den_range.min() => {
                    return Ok(Fixed(1));
                }
                _ => {}
            }
        }

        let mut num_factors = scale_and_pows(numerator, self.keys());
        let mut den_factors = scale_and_pows(denominator, self.keys());
        let mut changed = cancel_common_pows(&mut num_factors, &mut den_factors);

        let (num_scale, den_scale) = (num_factors.scale, den_factors.scale);
        if num_scale != 0 && den_scale != 0 {
            let mut g = gcd(num_scale, den_scale);
            if den_scale < 0 {
                g = -g;
            }
            if g != 1 && g != 0 {
                num_factors.scale = num_scale.wrapping_div(g);
                den_factors.scale = den_scale.wrapping_div(g);
                changed = true;
            }
        }

        if !changed {
            return Ok(DimExpr::Fraction {
                numerator: numerator.clone(),
                denominator: denominator.clone(),
                mode,
            }
            .into());
        }

        let reduced_num = num_factors.rebuild();
        let reduced_den = den_factors.rebuild();
        trace!(
            "cancelled common factors: ({}) / ({}) => ({}) / ({})",
            numerator, denominator, reduced_num, reduced_den
        );
        self.simplify_fraction(&reduced_num, &reduced_den, mode)
    }

    fn simplify_rem(
        &self,
        numerator: &Dimension,
        denominator: &Dimension,
        depth: usize,
    ) -> Result<Dimension, DimError> {
        use Dimension::{Fixed, Unknown};

        let raw = || -> Dimension {
            DimExpr::Remainder {
                numerator: numerator.clone(),
                denominator: denominator.clone(),
            }
            .into()
        };

        match (numerator, denominator) {
            (_, Fixed(0)) => return Err(DimError::DivideByZero(raw().to_string())),
            (Unknown, _) | (_, Unknown) => return Ok(Unknown),
            (_, Fixed(1 | -1)) => return Ok(Fixed(0)),
            (Fixed(n), Fixed(d)) => return Ok(Fixed(rem_floor(*n, *d))),
            (Fixed(0), _) => return Ok(Fixed(0)),
            _ => {}
        }

        let num_range = numerator.range();
        let den_range = denominator.range();
        if den_range.is_positive()
            && num_range.is_non_negative()
            && num_range.max() < den_range.min()
        {
            return Ok(numerator.clone());
        }

        if depth >= self.opts.max_rem_depth {
            debug!(
                "remainder reduction depth limit ({}) reached for {}",
                self.opts.max_rem_depth,
                raw()
            );
            return Ok(raw());
        }

        let num_factors = scale_and_pows(numerator, self.keys());
        let den_factors = scale_and_pows(denominator, self.keys());

        // Numerator is a multiple of the denominator.
        let divides = den_factors
            .pows
            .iter()
            .all(|(key, (_, e))| num_factors.exponent(key) >= *e);
        if divides && den_factors.scale != 0 && num_factors.scale.wrapping_rem(den_factors.scale) == 0 {
            return Ok(Fixed(0));
        }

        // (g * a) % (g * b) => g * (a % b)
        let mut num_rest = num_factors;
        let mut den_rest = den_factors;
        let mut common = Factors {
            scale: gcd(num_rest.scale, den_rest.scale),
            pows: Default::default(),
        };
        for (key, (base, den_exp)) in den_rest.pows.iter_mut() {
            let Some((_, num_exp)) = num_rest.pows.get_mut(key) else {
                continue;
            };
            let shared = (*num_exp).min(*den_exp);
            if shared == 0 {
                continue;
            }
            *num_exp -= shared;
            *den_exp -= shared;
            common.pows.insert(key.clone(), (base.clone(), shared));
        }

        if common.scale <= 1 && common.pows.is_empty() {
            return Ok(raw());
        }
        if common.scale > 1 {
            num_rest.scale /= common.scale;
            den_rest.scale /= common.scale;
        } else {
            common.scale = 1;
        }

        let inner_num = num_rest.rebuild();
        let inner_den = den_rest.rebuild();
        trace!(
            "factored common term out of ({}) % ({}): {} * (({}) % ({}))",
            numerator,
            denominator,
            common.rebuild(),
            inner_num,
            inner_den
        );
        let inner = self.simplify_rem(&inner_num, &inner_den, depth + 1)?;
        Ok(self.simplify_product(1, &[common.rebuild(), inner]))
    }

    fn simplify_at(&self, shape: Shape, index: Dimension) -> Result<Dimension, DimError> {
        if let (Some(dims), Some(i)) = (shape.known_dims(), index.as_fixed()) {
            let rank = dims.len() as i64;
            let i = if i < 0 { i + rank } else { i };
            if (0..rank).contains(&i) {
                return self.simplify(&dims[i as usize]);
            }
        }
        Ok(DimExpr::At { shape, index }.into())
    }
}

/// Cancel bases that appear in both `num` and `den`, returning true if
/// anything was cancelled.
fn cancel_common_pows(num: &mut Factors, den: &mut Factors) -> bool {
    let mut changed = false;
    for (key, (_, den_exp)) in den.pows.iter_mut() {
        let Some((_, num_exp)) = num.pows.get_mut(key) else {
            continue;
        };
        let shared = (*num_exp).min(*den_exp);
        if shared > 0 {
            *num_exp -= shared;
            *den_exp -= shared;
            changed = true;
        }
    }
    changed
}

fn simplify_power(base: &Dimension, power: u32) -> Dimension {
    if let Some(DimExpr::Power {
        base: inner,
        power: inner_power,
    }) = base.expr()
        && let Some(combined) = inner_power.checked_mul(power)
    {
        return inner.pow(combined);
    }
    base.pow(power)
}

/// Simplify a min (`is_max = false`) or max (`is_max = true`) of simplified
/// operands.
///
/// Nested nodes of the same type are flattened, and operands which can
/// never be the result according to their ranges are removed.
fn simplify_extremum(operands: &[Dimension], is_max: bool) -> Dimension {
    let mut flat: SmallVec<[Dimension; 4]> = SmallVec::new();
    for op in operands {
        match (op.expr(), is_max) {
            (Some(DimExpr::Min(inner)), false) | (Some(DimExpr::Max(inner)), true) => {
                flat.extend(inner.iter().cloned())
            }
            _ => flat.push(op.clone()),
        }
    }

    // `dominates(a, b)` is true if `a` is always selected over `b`.
    let dominates = |a: &Dimension, b: &Dimension| {
        let (a, b) = (a.range(), b.range());
        if is_max {
            a.min() >= b.max()
        } else {
            a.max() <= b.min()
        }
    };

    let mut keep: SmallVec<[bool; 4]> = SmallVec::from_elem(true, flat.len());
    for i in 0..flat.len() {
        if flat[i].is_unknown() {
            continue;
        }
        let dominated = (0..flat.len())
            .any(|j| j != i && keep[j] && !flat[j].is_unknown() && dominates(&flat[j], &flat[i]));
        if dominated {
            keep[i] = false;
        }
    }

    let kept = flat
        .into_iter()
        .zip(keep)
        .filter_map(|(op, keep)| keep.then_some(op));
    if is_max {
        Dimension::max_of(kept)
    } else {
        Dimension::min_of(kept)
    }
}
