//! Evaluation of dimensions and shapes with concrete or symbolic values for
//! their free variables.

use rustc_hash::FxHashMap;

use crate::dim::{DimExpr, DivMode, Dimension};
use crate::dim_ops::{div_fixed, positive_fixed, rem_floor};
use crate::errors::{DimError, EvalError};
use crate::shape::Shape;
use crate::var::{DimVar, ShapeVar};

/// Concrete values for free variables.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    dims: FxHashMap<DimVar, i64>,
    shapes: FxHashMap<ShapeVar, Vec<i64>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `var` to `value`, replacing any existing binding.
    pub fn bind_dim(&mut self, var: DimVar, value: i64) -> &mut Self {
        self.dims.insert(var, value);
        self
    }

    /// Bind the shape variable `var` to `value`.
    pub fn bind_shape(&mut self, var: ShapeVar, value: Vec<i64>) -> &mut Self {
        self.shapes.insert(var, value);
        self
    }

    pub fn dim(&self, var: &DimVar) -> Option<i64> {
        self.dims.get(var).copied()
    }

    pub fn shape(&self, var: &ShapeVar) -> Option<&[i64]> {
        self.shapes.get(var).map(|s| s.as_slice())
    }
}

impl Dimension {
    /// Compute the value of this dimension given values for its variables.
    ///
    /// Integer arithmetic wraps on overflow. Division and remainder round
    /// towards negative infinity, except for ceiling division.
    pub fn eval(&self, bindings: &Bindings) -> Result<i64, EvalError> {
        let node = match self {
            Self::Fixed(value) => return Ok(*value),
            Self::Unknown => return Err(EvalError::UnknownDimension),
            Self::Dynamic(node) => node,
        };

        let value = match node.expr() {
            DimExpr::Var(var) => bindings
                .dim(var)
                .ok_or_else(|| EvalError::UnboundVar(var.name().to_string()))?,
            DimExpr::Product { operands, scale } => {
                operands.iter().try_fold(*scale, |acc, op| {
                    op.eval(bindings).map(|v| acc.wrapping_mul(v))
                })?
            }
            DimExpr::Sum { operands, bias } => operands.iter().try_fold(*bias, |acc, op| {
                op.eval(bindings).map(|v| acc.wrapping_add(v))
            })?,
            DimExpr::Fraction {
                numerator,
                denominator,
                mode,
            } => {
                let n = numerator.eval(bindings)?;
                let d = nonzero(denominator.eval(bindings)?)?;
                div_fixed(n, d, *mode)
            }
            DimExpr::Remainder {
                numerator,
                denominator,
            } => {
                let n = numerator.eval(bindings)?;
                let d = nonzero(denominator.eval(bindings)?)?;
                rem_floor(n, d)
            }
            DimExpr::Power { base, power } => base.eval(bindings)?.wrapping_pow(*power),
            DimExpr::Abs(operand) => operand.eval(bindings)?.wrapping_abs(),
            DimExpr::Clamp { operand, min, max } => {
                let x = operand.eval(bindings)?;
                x.max(min.eval(bindings)?).min(max.eval(bindings)?)
            }
            DimExpr::CompareAndSelect {
                value,
                expected,
                true_value,
                false_value,
            } => {
                if value.eval(bindings)? == expected.eval(bindings)? {
                    true_value.eval(bindings)?
                } else {
                    false_value.eval(bindings)?
                }
            }
            DimExpr::Min(operands) => eval_extremum(operands, bindings, i64::min)?,
            DimExpr::Max(operands) => eval_extremum(operands, bindings, i64::max)?,
            DimExpr::Positive { index, extent } => {
                positive_fixed(index.eval(bindings)?, extent.eval(bindings)?)
            }
            DimExpr::At { shape, index } => {
                let values = shape.eval(bindings)?;
                let index = index.eval(bindings)?;
                let rank = values.len();
                let resolved = if index < 0 {
                    index.wrapping_add(rank as i64)
                } else {
                    index
                };
                if resolved < 0 || resolved >= rank as i64 {
                    return Err(EvalError::IndexOutOfRange { index, rank });
                }
                values[resolved as usize]
            }
            DimExpr::Expr(expr) => expr
                .get()
                .const_value()
                .ok_or_else(|| EvalError::Opaque(expr.to_string()))?,
        };
        Ok(value)
    }
}

fn nonzero(value: i64) -> Result<i64, EvalError> {
    if value == 0 {
        Err(EvalError::DivideByZero)
    } else {
        Ok(value)
    }
}

fn eval_extremum(
    operands: &[Dimension],
    bindings: &Bindings,
    op: fn(i64, i64) -> i64,
) -> Result<i64, EvalError> {
    let mut values = operands.iter().map(|d| d.eval(bindings));
    let first = values
        .next()
        .ok_or_else(|| EvalError::Opaque("empty min/max".to_string()))??;
    values.try_fold(first, |acc, v| v.map(|v| op(acc, v)))
}

impl Shape {
    /// Compute the concrete sizes of this shape given values for its
    /// variables.
    pub fn eval(&self, bindings: &Bindings) -> Result<Vec<i64>, EvalError> {
        match self {
            Self::Ranked(shape) => shape.iter().map(|d| d.eval(bindings)).collect(),
            Self::Var(var) => bindings
                .shape(var)
                .map(|s| s.to_vec())
                .ok_or_else(|| EvalError::UnboundVar(var.name().to_string())),
            Self::Of(shape_of) => match shape_of.inferred_shape() {
                Some(shape) => shape.eval(bindings),
                None => Err(EvalError::Opaque(self.to_string())),
            },
            Self::Unranked(_) | Self::Invalid => Err(EvalError::Opaque(self.to_string())),
        }
    }
}

/// Replacement expressions for free variables.
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    dims: FxHashMap<DimVar, Dimension>,
    shapes: FxHashMap<ShapeVar, Shape>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `var` with `dim`.
    pub fn insert_dim(&mut self, var: DimVar, dim: Dimension) -> &mut Self {
        self.dims.insert(var, dim);
        self
    }

    /// Replace the shape variable `var` with `shape`.
    pub fn insert_shape(&mut self, var: ShapeVar, shape: Shape) -> &mut Self {
        self.shapes.insert(var, shape);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty() && self.shapes.is_empty()
    }
}

impl Dimension {
    /// Replace free variables in this dimension according to `subst`.
    ///
    /// The result is rebuilt using the folding operators, so substituting
    /// constants for all variables produces a fixed dimension. The result is
    /// not otherwise simplified.
    pub fn substitute(&self, subst: &Substitution) -> Result<Dimension, DimError> {
        let Self::Dynamic(node) = self else {
            return Ok(self.clone());
        };

        let sub = |d: &Dimension| d.substitute(subst);
        let dim = match node.expr() {
            DimExpr::Var(var) => subst.dims.get(var).cloned().unwrap_or_else(|| self.clone()),
            DimExpr::Product { operands, scale } => {
                operands.iter().try_fold(Dimension::Fixed(*scale), |acc, op| {
                    sub(op).map(|op| acc * op)
                })?
            }
            DimExpr::Sum { operands, bias } => operands
                .iter()
                .try_fold(Dimension::Fixed(*bias), |acc, op| sub(op).map(|op| acc + op))?,
            DimExpr::Fraction {
                numerator,
                denominator,
                mode,
            } => {
                let numerator = sub(numerator)?;
                let denominator = sub(denominator)?;
                match mode {
                    DivMode::Floor => numerator.checked_div(&denominator)?,
                    DivMode::Ceil => numerator.checked_div_ceil(&denominator)?,
                }
            }
            DimExpr::Remainder {
                numerator,
                denominator,
            } => sub(numerator)?.checked_rem(&sub(denominator)?)?,
            DimExpr::Power { base, power } => sub(base)?.pow(*power),
            DimExpr::Abs(operand) => sub(operand)?.abs(),
            DimExpr::Clamp { operand, min, max } => sub(operand)?.clamp(&sub(min)?, &sub(max)?),
            DimExpr::CompareAndSelect {
                value,
                expected,
                true_value,
                false_value,
            } => Dimension::select(
                &sub(value)?,
                &sub(expected)?,
                &sub(true_value)?,
                &sub(false_value)?,
            ),
            DimExpr::Min(operands) => {
                Dimension::min_of(operands.iter().map(sub).collect::<Result<Vec<_>, _>>()?)
            }
            DimExpr::Max(operands) => {
                Dimension::max_of(operands.iter().map(sub).collect::<Result<Vec<_>, _>>()?)
            }
            DimExpr::Positive { index, extent } => Dimension::positive(&sub(index)?, &sub(extent)?),
            DimExpr::At { shape, index } => {
                let shape = shape.substitute(subst)?;
                let index = sub(index)?;
                match shape.dim_at(&index) {
                    Ok(dim) => dim,
                    Err(_) => DimExpr::At { shape, index }.into(),
                }
            }
            DimExpr::Expr(_) => self.clone(),
        };
        Ok(dim)
    }
}

impl Shape {
    /// Replace free dimension and shape variables in this shape.
    pub fn substitute(&self, subst: &Substitution) -> Result<Shape, DimError> {
        match self {
            Self::Ranked(shape) => {
                let dims = shape
                    .iter()
                    .map(|d| d.substitute(subst))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Shape::Ranked(shape.with_dims(dims)))
            }
            Self::Var(var) => Ok(subst.shapes.get(var).cloned().unwrap_or_else(|| self.clone())),
            _ => Ok(self.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bindings, Substitution};
    use crate::dim::{DimExpr, Dimension};
    use crate::errors::{DimError, EvalError};
    use crate::shape::Shape;
    use crate::value_range::ValueRange;
    use crate::var::VarScope;

    #[test]
    fn test_eval() {
        let scope = VarScope::new();
        let x = scope.new_dim_var("x");
        let y = scope.new_dim_var("y");
        let xd = Dimension::var(x.clone());
        let yd = Dimension::var(y.clone());

        let mut bindings = Bindings::new();
        bindings.bind_dim(x, 7).bind_dim(y, -2);

        let cases = [
            (&xd * 3 + &yd, 19),
            (&xd / &yd, -4),
            (xd.div_ceil(&yd), -3),
            (&xd % &yd, -1),
            (yd.pow(3), -8),
            (yd.abs(), 2),
            (xd.clamp(&0.into(), &5.into()), 5),
            (Dimension::max_of([xd.clone(), yd.clone(), 3.into()]), 7),
            (Dimension::min_of([xd.clone(), yd.clone()]), -2),
            (Dimension::positive(&yd, &xd), 5),
            (Dimension::select(&yd, &(-2).into(), &10.into(), &20.into()), 10),
        ];
        for (dim, expected) in cases {
            assert_eq!(dim.eval(&bindings), Ok(expected), "{}", dim);
        }
    }

    #[test]
    fn test_eval_errors() {
        let scope = VarScope::new();
        let x = scope.new_dim_var("x");
        let y = scope.dim_var("y");
        let xd = Dimension::var(x.clone());

        let mut bindings = Bindings::new();
        bindings.bind_dim(x, 0);

        assert_eq!(
            y.eval(&bindings),
            Err(EvalError::UnboundVar("y".to_string()))
        );
        assert_eq!((&y / &xd).eval(&bindings), Err(EvalError::UnboundVar("y".to_string())));
        assert_eq!((Dimension::from(4) / &xd).eval(&bindings), Err(EvalError::DivideByZero));
        assert_eq!(
            Dimension::Unknown.eval(&bindings),
            Err(EvalError::UnknownDimension)
        );
    }

    #[test]
    fn test_eval_shape() {
        let scope = VarScope::new();
        let n = scope.new_dim_var("n");
        let s = scope.new_shape_var("s", 3);

        let mut bindings = Bindings::new();
        bindings.bind_dim(n.clone(), 2).bind_shape(s.clone(), vec![4, 5, 6]);

        let shape = Shape::from(vec![Dimension::var(n), 3.into()]);
        assert_eq!(shape.eval(&bindings), Ok(vec![2, 3]));

        let s = Shape::Var(s);
        assert_eq!(s.eval(&bindings), Ok(vec![4, 5, 6]));
        assert_eq!(s.dim(-1).unwrap().eval(&bindings), Ok(6));

        let at: Dimension = DimExpr::At {
            shape: s,
            index: 3.into(),
        }
        .into();
        assert_eq!(
            at.eval(&bindings),
            Err(EvalError::IndexOutOfRange { index: 3, rank: 3 })
        );
    }

    #[test]
    fn test_substitute() {
        let scope = VarScope::new();
        let x = scope.new_dim_var("x");
        let y = scope.new_dim_var("y");
        let xd = Dimension::var(x.clone());
        let yd = Dimension::var(y.clone());

        let dim = (&xd * 4 + &yd) / 2;

        let mut subst = Substitution::new();
        subst.insert_dim(x.clone(), 3.into());
        assert_eq!(dim.substitute(&subst).unwrap().to_string(), "((y + 12) / 2)");

        subst.insert_dim(y.clone(), 6.into());
        assert_eq!(dim.substitute(&subst), Ok(Dimension::from(9)));

        let mut subst = Substitution::new();
        subst.insert_dim(y, 0.into());
        assert!(matches!(
            (&xd / &yd).substitute(&subst),
            Err(DimError::DivideByZero(_))
        ));
    }

    #[test]
    fn test_substitute_symbolic() {
        let scope = VarScope::new();
        let x = scope.new_dim_var("x");
        let n = scope.bounded_dim_var("n", ValueRange::new(1., 8.));
        let xd = Dimension::var(x.clone());

        let mut subst = Substitution::new();
        subst.insert_dim(x, &n * 2);

        let dim = &xd + 1;
        let result = dim.substitute(&subst).unwrap();
        assert_eq!(result.to_string(), "((n * 2) + 1)");
        assert_eq!(result.range(), ValueRange::new(3., 17.));
    }

    #[test]
    fn test_substitute_shape() {
        let scope = VarScope::new();
        let n = scope.new_dim_var("n");
        let s = scope.new_shape_var("s", 2);

        let mut subst = Substitution::new();
        subst
            .insert_dim(n.clone(), 5.into())
            .insert_shape(s.clone(), Shape::from([7, 9]));

        let shape = Shape::from(vec![Dimension::var(n), 2.into()]);
        assert_eq!(shape.substitute(&subst), Ok(Shape::from([5, 2])));

        // Indexed reads of a shape variable resolve after substitution.
        let last = Shape::Var(s).dim(-1).unwrap();
        assert_eq!(last.substitute(&subst), Ok(Dimension::from(9)));
    }
}
