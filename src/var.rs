//! Free symbols that stand for dimension sizes or whole shapes.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::dim::Dimension;
use crate::shape::Shape;
use crate::value_range::ValueRange;

/// Source of identities for free variables.
///
/// Every [`DimVar`] and [`ShapeVar`] is created by a scope. The scope hands
/// out increasing indices, which determine the order in which variables are
/// sorted inside canonical expressions. Variables created concurrently from
/// several threads via a shared reference all receive distinct indices.
///
/// ```
/// use rten_dims::VarScope;
///
/// let scope = VarScope::new();
/// let n = scope.dim_var("n");
/// let n2 = scope.dim_var("n");
///
/// // Variables are compared by identity, not by name.
/// assert_ne!(n, n2);
/// assert_eq!(n.to_string(), "n");
/// ```
pub struct VarScope {
    next_index: AtomicU32,
}

impl Default for VarScope {
    fn default() -> Self {
        Self::new()
    }
}

impl VarScope {
    pub fn new() -> Self {
        VarScope {
            next_index: AtomicU32::new(0),
        }
    }

    fn next_index(&self) -> u32 {
        self.next_index.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Number of variables created by this scope so far.
    pub fn len(&self) -> usize {
        self.next_index.load(AtomicOrdering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new variable with no assumptions about its value.
    pub fn new_dim_var(&self, name: impl Into<Cow<'static, str>>) -> DimVar {
        self.new_bounded_dim_var(name, ValueRange::full())
    }

    /// Create a new variable whose value is assumed to lie in `range`.
    pub fn new_bounded_dim_var(
        &self,
        name: impl Into<Cow<'static, str>>,
        range: ValueRange,
    ) -> DimVar {
        DimVar(Arc::new(DimSymbol {
            name: name.into(),
            index: self.next_index(),
            range,
        }))
    }

    /// Create a dimension consisting of a new unbounded variable.
    pub fn dim_var(&self, name: impl Into<Cow<'static, str>>) -> Dimension {
        Dimension::var(self.new_dim_var(name))
    }

    /// Create a dimension consisting of a new variable bounded by `range`.
    pub fn bounded_dim_var(
        &self,
        name: impl Into<Cow<'static, str>>,
        range: ValueRange,
    ) -> Dimension {
        Dimension::var(self.new_bounded_dim_var(name, range))
    }

    /// Create a new variable standing for a shape with `rank` dimensions.
    pub fn new_shape_var(&self, name: impl Into<Cow<'static, str>>, rank: usize) -> ShapeVar {
        ShapeVar(Arc::new(ShapeSymbol {
            name: name.into(),
            index: self.next_index(),
            rank,
        }))
    }

    /// Create a shape consisting of a new shape variable.
    pub fn shape_var(&self, name: impl Into<Cow<'static, str>>, rank: usize) -> Shape {
        Shape::Var(self.new_shape_var(name, rank))
    }
}

struct DimSymbol {
    name: Cow<'static, str>,
    index: u32,
    range: ValueRange,
}

/// A free variable standing for an unknown integer.
///
/// Two variables are equal only if they were produced by the same call to
/// [`VarScope::new_dim_var`] (or one of its siblings). Clones of a variable
/// share its identity.
#[derive(Clone)]
pub struct DimVar(Arc<DimSymbol>);

impl DimVar {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Index assigned by the scope which created this variable.
    pub fn index(&self) -> u32 {
        self.0.index
    }

    /// Range of values this variable is assumed to take.
    pub fn range(&self) -> ValueRange {
        self.0.range
    }

    /// Order variables by creation index, breaking ties between variables
    /// from different scopes by address.
    pub(crate) fn canonical_cmp(&self, other: &DimVar) -> Ordering {
        self.index()
            .cmp(&other.index())
            .then_with(|| Arc::as_ptr(&self.0).cmp(&Arc::as_ptr(&other.0)))
    }
}

impl PartialEq for DimVar {
    fn eq(&self, other: &DimVar) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DimVar {}

impl Hash for DimVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.index.hash(state);
    }
}

impl fmt::Display for DimVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl fmt::Debug for DimVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.index)
    }
}

struct ShapeSymbol {
    name: Cow<'static, str>,
    index: u32,
    rank: usize,
}

/// A free variable standing for a shape of known rank but unknown sizes.
#[derive(Clone)]
pub struct ShapeVar(Arc<ShapeSymbol>);

impl ShapeVar {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn index(&self) -> u32 {
        self.0.index
    }

    pub fn rank(&self) -> usize {
        self.0.rank
    }

    pub(crate) fn canonical_cmp(&self, other: &ShapeVar) -> Ordering {
        self.index()
            .cmp(&other.index())
            .then_with(|| Arc::as_ptr(&self.0).cmp(&Arc::as_ptr(&other.0)))
    }
}

impl PartialEq for ShapeVar {
    fn eq(&self, other: &ShapeVar) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ShapeVar {}

impl Hash for ShapeVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.index.hash(state);
    }
}

impl fmt::Display for ShapeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl fmt::Debug for ShapeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}<{}>", self.0.name, self.0.index, self.0.rank)
    }
}
