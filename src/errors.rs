//! Error types reported by dimension and shape operations.
//!
//! Errors carry the rendering of the offending dimension or shape, so that a
//! failing compiler pass can report what it was looking at.

use thiserror::Error;

/// Errors from operations on a single [`Dimension`](crate::Dimension).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DimError {
    /// Division or remainder where the divisor is the literal zero.
    #[error("division by zero in `{0}`")]
    DivideByZero(String),

    /// A fixed value was requested from a dimension which is not fixed.
    #[error("dimension `{0}` is not fixed")]
    NotFixed(String),
}

/// Errors from operations on a [`Shape`](crate::Shape).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ShapeError {
    /// The operation is not supported for this kind of shape, eg. querying
    /// the rank of an invalid or unranked shape.
    #[error("cannot get {op} of shape `{shape}`")]
    InvalidOperation { op: &'static str, shape: String },

    /// Elementwise operation between shapes of different ranks.
    #[error("rank mismatch between `{lhs}` and `{rhs}`")]
    RankMismatch { lhs: String, rhs: String },

    /// The shapes cannot be broadcast together.
    #[error("shapes `{lhs}` and `{rhs}` are not broadcast-compatible")]
    Incompatible { lhs: String, rhs: String },

    /// Concrete values were requested from a shape which is not fixed.
    #[error("shape `{0}` is not fixed")]
    NotFixed(String),

    /// An index is outside `[-rank, rank)`.
    #[error("index {index} is out of range for rank {rank}")]
    IndexOutOfRange { index: i64, rank: usize },

    /// A flat `[starts..., ends...]` padding list with an odd length.
    #[error("padding list has odd length {0}")]
    OddPadCount(usize),

    #[error(transparent)]
    Dim(#[from] DimError),
}

/// Errors from evaluating a dimension with concrete variable values.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    /// A variable has no value in the bindings.
    #[error("no value bound for `{0}`")]
    UnboundVar(String),

    #[error("division by zero")]
    DivideByZero,

    /// The expression contains an unknown dimension.
    #[error("cannot evaluate unknown dimension")]
    UnknownDimension,

    /// The expression refers to a value outside this layer, such as an
    /// expression from the operator IR without a constant value.
    #[error("cannot evaluate `{0}`")]
    Opaque(String),

    /// A shape was indexed outside its bounds.
    #[error("index {index} is out of range for rank {rank}")]
    IndexOutOfRange { index: i64, rank: usize },
}
