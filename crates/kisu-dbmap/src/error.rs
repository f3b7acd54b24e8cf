//! Error types for record map operations.

use kisu_host::HostError;
use thiserror::Error;

/// Errors that can occur during map operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// The record key cannot be embedded in a property key.
    #[error("invalid record key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The map id cannot be embedded in a property key.
    #[error("invalid map id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// A record could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The property substrate failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Convenience type alias for map operations.
pub type MapResult<T> = std::result::Result<T, MapError>;
