//! Error types for the reactive runtime.
//!
//! Most failures inside the engine are diagnostics rather than errors: a
//! computation that panics is logged and swallowed so that its siblings in
//! the same flush still run. The variants here are what those diagnostics
//! carry, plus the few API misuses that are reported back to the caller.

use thiserror::Error;

use crate::reactive::ComputationId;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Boxed error returned by fallible effect bodies (see [`crate::try_effect`]).
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computation retriggered itself more times than the configured limit.
    #[error("computation {computation} ({label}) exceeded the reentrancy limit of {limit}")]
    ReentrancyOverflow {
        computation: ComputationId,
        label: String,
        limit: u32,
    },

    /// A user-supplied body panicked or returned an error.
    #[error("computation {computation} ({label}) failed: {message}")]
    ComputationFailed {
        computation: ComputationId,
        label: String,
        message: String,
    },

    /// Attempted to write a computed (virtual) field.
    #[error("field `{key}` is computed and cannot be assigned")]
    ReadOnlyField { key: String },

    /// Attempted to install a computed over an existing field.
    #[error("field `{key}` already exists")]
    FieldConflict { key: String },

    /// The field does not hold an array.
    #[error("field `{key}` does not hold an array")]
    NotAnArray { key: String },

    /// Index write beyond the end of an array.
    #[error("index {index} is out of bounds for an array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Rejected runtime configuration.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

impl ReactiveError {
    /// The computation this error is attributed to, if any.
    pub fn computation(&self) -> Option<ComputationId> {
        match self {
            Self::ReentrancyOverflow { computation, .. }
            | Self::ComputationFailed { computation, .. } => Some(*computation),
            _ => None,
        }
    }
}
