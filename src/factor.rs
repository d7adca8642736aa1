//! Decomposition of products and sums into constant and symbolic parts.
//!
//! Products are viewed as `scale * Π base^exponent` and sums as
//! `bias + Σ coefficient * term`. Simplifying a product, sum, fraction or
//! remainder works on these decomposed forms and then rebuilds a canonical
//! expression.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::dim::{DimExpr, DimList, Dimension};
use crate::simplify::OperandKeys;

/// Key used to decide whether two operands are the same base or term.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum TermKey {
    /// Operands are merged if they are structurally equal.
    Structural(Dimension),
    /// Operands are merged only if they are the same node.
    Identity(usize),
}

impl TermKey {
    pub fn new(dim: &Dimension, keys: OperandKeys) -> TermKey {
        match (keys, dim) {
            // Variables already compare by identity.
            (OperandKeys::Identity, Dimension::Dynamic(node)) if dim.as_var().is_none() => {
                TermKey::Identity(node.addr())
            }
            _ => TermKey::Structural(dim.clone()),
        }
    }
}

/// A product decomposed as `scale * Π base^exponent`.
pub(crate) struct Factors {
    pub scale: i64,
    pub pows: FxHashMap<TermKey, (Dimension, u32)>,
}

impl Factors {
    fn new(scale: i64) -> Self {
        Factors {
            scale,
            pows: FxHashMap::default(),
        }
    }

    fn insert(&mut self, key: TermKey, base: Dimension, exponent: u32) {
        self.pows
            .entry(key)
            .and_modify(|(_, e)| *e = e.saturating_add(exponent))
            .or_insert((base, exponent));
    }

    pub fn merge(&mut self, other: Factors) {
        self.scale = self.scale.wrapping_mul(other.scale);
        for (key, (base, exponent)) in other.pows {
            self.insert(key, base, exponent);
        }
    }

    fn raise(mut self, power: u32) -> Factors {
        self.scale = self.scale.wrapping_pow(power);
        for (_, e) in self.pows.values_mut() {
            *e = e.saturating_mul(power);
        }
        self
    }

    /// Exponent of the base with the given key, or zero if absent.
    pub fn exponent(&self, key: &TermKey) -> u32 {
        self.pows.get(key).map(|(_, e)| *e).unwrap_or(0)
    }

    /// Rebuild the product as a canonical dimension.
    pub fn rebuild(&self) -> Dimension {
        rebuild_product(self.scale, self.pows.values().cloned())
    }
}

/// Decompose `dim` into a constant scale and a map of bases to exponents.
///
/// Nested products and powers are flattened.
pub(crate) fn scale_and_pows(dim: &Dimension, keys: OperandKeys) -> Factors {
    match dim {
        Dimension::Fixed(value) => Factors::new(*value),
        Dimension::Dynamic(node) => match node.expr() {
            DimExpr::Product { operands, scale } => {
                let mut factors = Factors::new(*scale);
                for op in operands {
                    factors.merge(scale_and_pows(op, keys));
                }
                factors
            }
            DimExpr::Power { base, power } => scale_and_pows(base, keys).raise(*power),
            _ => {
                let mut factors = Factors::new(1);
                factors.insert(TermKey::new(dim, keys), dim.clone(), 1);
                factors
            }
        },
        Dimension::Unknown => {
            let mut factors = Factors::new(1);
            factors.insert(TermKey::Structural(Dimension::Unknown), Dimension::Unknown, 1);
            factors
        }
    }
}

/// Build a canonical product from a scale and a list of `(base, exponent)`
/// pairs.
pub(crate) fn rebuild_product(
    scale: i64,
    pows: impl IntoIterator<Item = (Dimension, u32)>,
) -> Dimension {
    if scale == 0 {
        return Dimension::Fixed(0);
    }

    let mut operands: DimList = pows
        .into_iter()
        .filter(|(_, e)| *e > 0)
        .map(|(base, e)| match e {
            1 => base,
            _ => DimExpr::Power { base, power: e }.into(),
        })
        .collect();
    operands.sort_by(|a, b| a.canonical_cmp(b));

    match operands.len() {
        0 => Dimension::Fixed(scale),
        1 if scale == 1 => operands.remove(0),
        _ => DimExpr::Product { operands, scale }.into(),
    }
}

/// A sum decomposed as `bias + Σ coefficient * term`.
pub(crate) struct Terms {
    pub bias: i64,
    pub coeffs: FxHashMap<TermKey, (Dimension, i64)>,
}

impl Terms {
    pub fn new(bias: i64) -> Self {
        Terms {
            bias,
            coeffs: FxHashMap::default(),
        }
    }

    fn insert(&mut self, key: TermKey, term: Dimension, coeff: i64) {
        self.coeffs
            .entry(key)
            .and_modify(|(_, c)| *c = c.wrapping_add(coeff))
            .or_insert((term, coeff));
    }

    pub fn merge(&mut self, other: Terms) {
        self.bias = self.bias.wrapping_add(other.bias);
        for (key, (term, coeff)) in other.coeffs {
            self.insert(key, term, coeff);
        }
    }

    fn scaled(mut self, scale: i64) -> Terms {
        self.bias = self.bias.wrapping_mul(scale);
        for (_, c) in self.coeffs.values_mut() {
            *c = c.wrapping_mul(scale);
        }
        self
    }

    /// Rebuild the sum as a canonical dimension.
    pub fn rebuild(&self) -> Dimension {
        rebuild_sum(self.bias, self.coeffs.values().cloned())
    }
}

/// Decompose `dim` into a constant bias and a map of terms to coefficients.
///
/// Nested sums are flattened. Products are split into a coefficient and a
/// monomial, so that `x * 2` and `x * 3` are like terms.
pub(crate) fn bias_and_terms(dim: &Dimension, keys: OperandKeys) -> Terms {
    match dim {
        Dimension::Fixed(value) => Terms::new(*value),
        Dimension::Dynamic(node) => match node.expr() {
            DimExpr::Sum { operands, bias } => {
                let mut terms = Terms::new(*bias);
                for op in operands {
                    terms.merge(bias_and_terms(op, keys));
                }
                terms
            }
            DimExpr::Product { .. } => {
                let factors = scale_and_pows(dim, keys);
                let mut terms = Terms::new(0);
                if factors.scale != 0 {
                    let monomial = rebuild_product(1, factors.pows.into_values());
                    if let Some(value) = monomial.as_fixed() {
                        terms.bias = factors.scale.wrapping_mul(value);
                    } else if let Some(DimExpr::Sum { .. }) = monomial.expr() {
                        // c * (a + b) => c*a + c*b
                        terms = bias_and_terms(&monomial, keys).scaled(factors.scale);
                    } else {
                        terms.insert(TermKey::new(&monomial, keys), monomial, factors.scale);
                    }
                }
                terms
            }
            _ => {
                let mut terms = Terms::new(0);
                terms.insert(TermKey::new(dim, keys), dim.clone(), 1);
                terms
            }
        },
        Dimension::Unknown => {
            let mut terms = Terms::new(0);
            terms.insert(TermKey::Structural(Dimension::Unknown), Dimension::Unknown, 1);
            terms
        }
    }
}

/// Multiply `term` by the constant `coeff`, merging into an existing product
/// scale if possible.
fn scaled(term: Dimension, coeff: i64) -> Dimension {
    match term.expr() {
        Some(DimExpr::Product { operands, scale: 1 }) => DimExpr::Product {
            operands: operands.clone(),
            scale: coeff,
        }
        .into(),
        _ => DimExpr::Product {
            operands: SmallVec::from_elem(term, 1),
            scale: coeff,
        }
        .into(),
    }
}

/// Build a canonical sum from a bias and a list of `(term, coefficient)`
/// pairs.
pub(crate) fn rebuild_sum(bias: i64, terms: impl IntoIterator<Item = (Dimension, i64)>) -> Dimension {
    let mut operands: DimList = terms
        .into_iter()
        .filter(|(_, c)| *c != 0)
        .map(|(term, c)| match c {
            1 => term,
            _ => scaled(term, c),
        })
        .collect();
    operands.sort_by(|a, b| a.canonical_cmp(b));

    match operands.len() {
        0 => Dimension::Fixed(bias),
        1 if bias == 0 => operands.remove(0),
        _ => DimExpr::Sum { operands, bias }.into(),
    }
}

/// Greatest common divisor of `a` and `b`. The result is non-negative.
pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.min(i64::MAX as u64) as i64
}
