//! Shared error type for the crates below `layers`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}
