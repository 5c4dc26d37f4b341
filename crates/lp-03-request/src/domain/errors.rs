//! # Domain Errors

use shared_types::PoolError;
use thiserror::Error;

/// Failure while decoding node traffic or maintaining the ledger view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The node message is not JSON or has an unknown `op`.
    #[error("Malformed node message: {0}")]
    Malformed(String),

    /// A well-formed message lacks a field needed to route or apply it.
    #[error("Missing field {0} in node message")]
    MissingField(&'static str),

    /// Hash or transaction encoding failed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Catch-up data does not extend the local ledger toward the target.
    #[error("Invalid catch-up data: {0}")]
    InvalidCatchup(String),
}

impl From<RequestError> for PoolError {
    fn from(err: RequestError) -> Self {
        PoolError::Protocol(err.to_string())
    }
}
