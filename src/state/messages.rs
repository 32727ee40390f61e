//! Errors raised by `StateManager` operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state record not found: {0}")]
    NotFound(String),

    #[error("state store error: {0}")]
    StoreError(String),

    #[error("state deserialization error: {0}")]
    DeserializationError(String),
}

pub type StateResponse<T> = Result<T, StateError>;

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        Self::StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        Self::DeserializationError(e.to_string())
    }
}
