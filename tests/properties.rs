//! Property tests for dimension expressions.
//!
//! Random expression trees are built over a few bounded variables and
//! checked against concrete evaluation.

use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher};

use proptest::prelude::*;
use rten_dims::{Bindings, DimError, DimVar, Dimension, Shape, ValueRange, VarScope};

/// Largest magnitude allowed for any sub-expression, so that evaluation
/// never overflows.
const LIMIT: f64 = 1e9;

#[derive(Clone, Debug)]
enum Node {
    Const(i64),
    Var(usize),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    DivCeil(Box<Node>, Box<Node>),
    Rem(Box<Node>, Box<Node>),
    Pow(Box<Node>, u32),
    Abs(Box<Node>),
    Neg(Box<Node>),
    Min(Box<Node>, Box<Node>),
    Max(Box<Node>, Box<Node>),
    Clamp(Box<Node>, Box<Node>, Box<Node>),
    Select(Box<Node>, Box<Node>, Box<Node>, Box<Node>),
    Positive(Box<Node>, Box<Node>),
    /// Indexed read from the shape `[a, 7, c]`.
    At(Box<Node>),
}

/// Variables `a in [1, 20]`, `b in [-20, 20]` and `c in [0, 20]`.
struct Vars {
    vars: Vec<DimVar>,
    dims: Vec<Dimension>,
}

impl Vars {
    fn new(scope: &VarScope) -> Self {
        let vars = vec![
            scope.new_bounded_dim_var("a", ValueRange::new(1., 20.)),
            scope.new_bounded_dim_var("b", ValueRange::new(-20., 20.)),
            scope.new_bounded_dim_var("c", ValueRange::new(0., 20.)),
        ];
        let dims = vars.iter().cloned().map(Dimension::from).collect();
        Vars { vars, dims }
    }

    fn bind(&self, values: [i64; 3]) -> Bindings {
        let mut bindings = Bindings::new();
        for (var, value) in self.vars.iter().zip(values) {
            bindings.bind_dim(var.clone(), value);
        }
        bindings
    }
}

fn boxed2(pair: (Node, Node)) -> (Box<Node>, Box<Node>) {
    (Box::new(pair.0), Box::new(pair.1))
}

fn leaf(consts: impl Strategy<Value = i64> + 'static) -> BoxedStrategy<Node> {
    prop_oneof![consts.prop_map(Node::Const), (0usize..3).prop_map(Node::Var)].boxed()
}

/// Trees using every kind of operation.
fn any_node() -> impl Strategy<Value = Node> {
    leaf(-6i64..=6).prop_recursive(4, 24, 4, |inner| {
        let pair = (inner.clone(), inner.clone()).prop_map(boxed2);
        prop_oneof![
            pair.clone().prop_map(|(a, b)| Node::Add(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Sub(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Mul(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Div(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::DivCeil(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Rem(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Min(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Max(a, b)).boxed(),
            pair.clone().prop_map(|(a, b)| Node::Positive(a, b)).boxed(),
            (inner.clone(), 0u32..=3)
                .prop_map(|(a, p)| Node::Pow(Box::new(a), p))
                .boxed(),
            inner.clone().prop_map(|a| Node::Abs(Box::new(a))).boxed(),
            inner.clone().prop_map(|a| Node::Neg(Box::new(a))).boxed(),
            inner.clone().prop_map(|i| Node::At(Box::new(i))).boxed(),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(x, lo, hi)| Node::Clamp(Box::new(x), Box::new(lo), Box::new(hi)))
                .boxed(),
            (inner.clone(), inner.clone(), inner.clone(), inner)
                .prop_map(|(v, e, t, f)| Node::Select(
                    Box::new(v),
                    Box::new(e),
                    Box::new(t),
                    Box::new(f)
                ))
                .boxed(),
        ]
    })
}

/// Polynomials built from sums, differences and products.
fn polynomial() -> impl Strategy<Value = Node> {
    leaf(-6i64..=6).prop_recursive(4, 24, 2, |inner| {
        let pair = (inner.clone(), inner.clone()).prop_map(boxed2);
        prop_oneof![
            pair.clone().prop_map(|(a, b)| Node::Add(a, b)),
            pair.clone().prop_map(|(a, b)| Node::Sub(a, b)),
            pair.prop_map(|(a, b)| Node::Mul(a, b)),
            inner.prop_map(|a| Node::Neg(Box::new(a))),
        ]
    })
}

/// Deeply nested divisions and remainders by positive constants and
/// variables.
fn nested_division() -> impl Strategy<Value = Node> {
    leaf(1i64..=12).prop_recursive(8, 64, 2, |inner| {
        let pair = (inner.clone(), inner.clone()).prop_map(boxed2);
        prop_oneof![
            pair.clone().prop_map(|(a, b)| Node::Div(a, b)),
            pair.clone().prop_map(|(a, b)| Node::DivCeil(a, b)),
            pair.clone().prop_map(|(a, b)| Node::Rem(a, b)),
            pair.clone().prop_map(|(a, b)| Node::Mul(a, b)),
            pair.prop_map(|(a, b)| Node::Add(a, b)),
        ]
    })
}

fn var_values() -> impl Strategy<Value = [i64; 3]> {
    (1i64..=20, -20i64..=20, 0i64..=20).prop_map(|(a, b, c)| [a, b, c])
}

/// Build the dimension for `node` using the folding operators.
///
/// Returns `None` for trees with a literal zero divisor, or where the range
/// of some sub-expression is too large to evaluate without overflow.
fn build(node: &Node, vars: &[Dimension]) -> Option<Dimension> {
    build_unchecked(node, vars, &|dim: Dimension| {
        let range = dim.range();
        (range.min() >= -LIMIT && range.max() <= LIMIT).then_some(dim)
    })
}

fn build_unchecked(
    node: &Node,
    vars: &[Dimension],
    check: &dyn Fn(Dimension) -> Option<Dimension>,
) -> Option<Dimension> {
    let sub = |node: &Node| build_unchecked(node, vars, check);
    let dim = match node {
        Node::Const(value) => Dimension::Fixed(*value),
        Node::Var(index) => vars[*index].clone(),
        Node::Add(a, b) => sub(a)? + sub(b)?,
        Node::Sub(a, b) => sub(a)? - sub(b)?,
        Node::Mul(a, b) => sub(a)? * sub(b)?,
        Node::Div(a, b) => sub(a)?.checked_div(&sub(b)?).ok()?,
        Node::DivCeil(a, b) => sub(a)?.checked_div_ceil(&sub(b)?).ok()?,
        Node::Rem(a, b) => sub(a)?.checked_rem(&sub(b)?).ok()?,
        Node::Pow(a, power) => sub(a)?.pow(*power),
        Node::Abs(a) => sub(a)?.abs(),
        Node::Neg(a) => -sub(a)?,
        Node::Min(a, b) => sub(a)?.min(&sub(b)?),
        Node::Max(a, b) => sub(a)?.max(&sub(b)?),
        Node::Clamp(x, lo, hi) => sub(x)?.clamp(&sub(lo)?, &sub(hi)?),
        Node::Select(v, e, t, f) => Dimension::select(&sub(v)?, &sub(e)?, &sub(t)?, &sub(f)?),
        Node::Positive(index, extent) => Dimension::positive(&sub(index)?, &sub(extent)?),
        Node::At(index) => Shape::ranked([vars[0].clone(), 7.into(), vars[2].clone()])
            .dim_at(&sub(index)?)
            .ok()?,
    };
    check(dim)
}

fn hash_of(dim: &Dimension) -> u64 {
    BuildHasherDefault::<DefaultHasher>::default().hash_one(dim)
}

proptest! {
    #[test]
    fn range_contains_evaluated_value(node in any_node(), values in var_values()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let Some(dim) = build(&node, &vars.dims) else {
            return Ok(());
        };

        if let Ok(value) = dim.eval(&vars.bind(values)) {
            prop_assert!(
                dim.range().contains(value),
                "{} = {} is outside {:?}", dim, value, dim.range()
            );
        }
    }

    #[test]
    fn simplify_preserves_value(node in any_node(), values in var_values()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let Some(dim) = build(&node, &vars.dims) else {
            return Ok(());
        };
        let bindings = vars.bind(values);

        // A divisor which is zero makes the whole expression undefined, so
        // simplification may produce anything.
        let Ok(expected) = dim.eval(&bindings) else {
            return Ok(());
        };

        let simplified = dim.simplify();
        prop_assert!(simplified.is_ok(), "simplifying {} failed: {:?}", dim, simplified);
        let simplified = simplified.unwrap();
        prop_assert_eq!(
            simplified.eval(&bindings),
            Ok(expected),
            "{} simplified to {}", dim, simplified
        );
        prop_assert!(simplified.range().contains(expected));
    }

    #[test]
    fn equal_trees_are_equal(node in any_node()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let (Some(a), Some(b)) = (build(&node, &vars.dims), build(&node, &vars.dims)) else {
            return Ok(());
        };

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash_of(&a), hash_of(&b));

        let (a, b) = (a.simplify(), b.simplify());
        prop_assert_eq!(&a, &b);
        if let (Ok(a), Ok(b)) = (a, b) {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn identity_laws(node in any_node()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let Some(x) = build(&node, &vars.dims) else {
            return Ok(());
        };

        prop_assert_eq!(&x + 0, x.clone());
        prop_assert_eq!(&x - 0, x.clone());
        prop_assert_eq!(&x * 1, x.clone());
        prop_assert_eq!(&x * 0, Dimension::Fixed(0));
        prop_assert_eq!(x.checked_div(&1.into()), Ok(x.clone()));
        prop_assert_eq!(x.checked_rem(&1.into()), Ok(Dimension::Fixed(0)));
        prop_assert_eq!(x.min(&x), x.clone());
        prop_assert_eq!(x.max(&x), x.clone());
        prop_assert_eq!(x.pow(1), x.clone());
        prop_assert_eq!(x.pow(0), Dimension::Fixed(1));
    }

    #[test]
    fn polynomial_minus_itself_is_zero(node in polynomial(), values in var_values()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let Some(p) = build(&node, &vars.dims) else {
            return Ok(());
        };

        let diff = (&p - &p).simplify().unwrap();
        prop_assert_eq!(&diff, &Dimension::Fixed(0), "{} - {} simplified to {}", p, p, diff);

        let bindings = vars.bind(values);
        let doubled = (&p + &p).simplify().unwrap();
        prop_assert_eq!(doubled.eval(&bindings), (&p * 2).eval(&bindings));
    }

    #[test]
    fn nested_division_terminates(node in nested_division()) {
        let scope = VarScope::new();
        let vars = Vars::new(&scope);
        let Some(dim) = build_unchecked(&node, &vars.dims, &|dim: Dimension| Some(dim)) else {
            return Ok(());
        };

        // Range shortcuts can reduce a divisor to zero, eg. `x / ((c % 5) / 12)`.
        let simplified = dim.simplify();
        prop_assert!(
            matches!(simplified, Ok(_) | Err(DimError::DivideByZero(_))),
            "simplifying {} failed: {:?}", dim, simplified
        );
    }
}
