//! Error types for the ZeroSync core.

use thiserror::Error;

/// Errors raised while interpreting core data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown operation code: {0}")]
    UnknownOperation(String),

    #[error("operation {op} is missing field {field}")]
    MissingField { op: &'static str, field: &'static str },

    #[error("unknown file flag: {0}")]
    UnknownFlag(String),
}
