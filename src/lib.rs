//! Symbolic dimensions and shapes for the RTen model compiler.
//!
//! Every value in the compiler's IR has a [`Shape`]. A ranked shape is a
//! list of [`Dimension`]s, each of which is a fixed size, an unknown size or
//! a symbolic expression such as `batch * 2` built from variables created by
//! a [`VarScope`].
//!
//! Dimensions are combined using the usual arithmetic operators, which fold
//! constants eagerly. [`Dimension::simplify`] rewrites an expression into a
//! canonical form, so that dimensions which are equal as expressions compare
//! and hash equal. Every symbolic dimension also carries a [`ValueRange`]
//! bounding the values it can take, which simplification uses to eliminate
//! redundant operations.
//!
//! ```
//! use rten_dims::{Shape, VarScope};
//!
//! let scope = VarScope::new();
//! let n = scope.dim_var("n");
//!
//! let dim = (&n * 6) / 3;
//! assert_eq!(dim.simplify().unwrap().to_string(), "(n * 2)");
//!
//! let shape = Shape::ranked([n.clone(), 3.into(), 224.into(), 224.into()]);
//! assert_eq!(shape.to_string(), "[n,3,224,224]");
//! assert_eq!(shape.dim(-1).unwrap().as_fixed(), Some(224));
//! ```
//!
//! # Configuration
//!
//! [`SimplifyOptions::from_env`] reads these environment variables:
//!
//! - `RTEN_DIMS_IDENTITY_KEYS` - If set to a true value, only merge terms
//!   of sums and products which share the same node.
//! - `RTEN_DIMS_REM_DEPTH` - Maximum nesting depth when factoring remainder
//!   expressions.
//!
//! # Crate features
//!
//! - **serde** - Implement `Serialize` and `Deserialize` for ranges and
//!   shapes.

mod dim;
mod dim_ops;
mod env;
mod errors;
mod eval;
mod expr;
mod factor;
mod padding;
mod shape;
mod simplify;
mod value_range;
mod var;

#[cfg(feature = "serde")]
mod impl_serialize;

#[cfg(test)]
mod testing;

pub use dim::{DimExpr, DimKind, DimList, Dimension, DivMode, DynDim};
pub use errors::{DimError, EvalError, ShapeError};
pub use eval::{Bindings, Substitution};
pub use expr::{ExprRef, IrExpr};
pub use factor::gcd;
pub use padding::{Padding, Paddings, SamePad, conv_output_size};
pub use shape::{DimVec, RankedShape, Shape, ShapeKind, ShapeOf, UnrankedShape, ValueArrayExpr};
pub use simplify::{OperandKeys, SimplifyOptions};
pub use value_range::ValueRange;
pub use var::{DimVar, ShapeVar, VarScope};
