//! Error types for the converge engine.

use thiserror::Error;

/// All possible errors from the converge engine.
///
/// Every variant is a validation failure: malformed trees, paths, patch
/// operations or waiter parameters. None of them are retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Tree errors
    #[error("type mismatch at '{path}': old is {old}, new is {new}")]
    TypeMismatch {
        path: String,
        old: &'static str,
        new: &'static str,
    },

    #[error("non-finite number at '{0}'")]
    NonFiniteNumber(String),

    #[error("unsupported value at '{path}': {reason}")]
    UnsupportedValue { path: String, reason: String },

    // Path errors
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    // Patch errors
    #[error("'{op}' operation at '{path}' {reason}")]
    InvalidOperation {
        op: &'static str,
        path: String,
        reason: &'static str,
    },

    // Waiter errors
    #[error("invalid waiter spec: {0}")]
    InvalidWaiterSpec(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
