use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
