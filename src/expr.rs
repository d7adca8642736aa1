//! Interface to expressions of the wider operator IR.
//!
//! Dimensions and shapes sometimes need to refer to values computed by
//! ordinary operators, for example the shape of an operator's output
//! (`ShapeOf`) or a scalar tensor used as a dimension size. This layer does
//! not know about those operators. It sees them only through [`IrExpr`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::shape::Shape;
use crate::value_range::ValueRange;

/// An expression of the operator IR, as seen by the dimension layer.
///
/// All methods have defaults which report that nothing is known.
pub trait IrExpr: fmt::Debug + fmt::Display + Send + Sync {
    /// The shape inferred for the value this expression produces, if type
    /// inference has run.
    fn inferred_shape(&self) -> Option<Shape> {
        None
    }

    /// The value of this expression, if it is a constant integer scalar.
    fn const_value(&self) -> Option<i64> {
        None
    }

    /// Range annotation for the value of this expression, if any.
    fn value_range(&self) -> Option<ValueRange> {
        None
    }
}

/// Shared handle to an [`IrExpr`].
///
/// Handles compare equal if they refer to the same expression node.
#[derive(Clone)]
pub struct ExprRef(Arc<dyn IrExpr>);

impl ExprRef {
    pub fn new(expr: impl IrExpr + 'static) -> Self {
        ExprRef(Arc::new(expr))
    }

    pub fn get(&self) -> &dyn IrExpr {
        self.0.as_ref()
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl From<Arc<dyn IrExpr>> for ExprRef {
    fn from(expr: Arc<dyn IrExpr>) -> Self {
        ExprRef(expr)
    }
}

impl PartialEq for ExprRef {
    fn eq(&self, other: &ExprRef) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ExprRef {}

impl Hash for ExprRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}
