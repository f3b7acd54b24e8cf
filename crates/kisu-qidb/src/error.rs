//! Error types for the item store.

use kisu_host::HostError;
use thiserror::Error;

/// Errors that can occur in item store operations.
#[derive(Debug, Error)]
pub enum QidbError {
    /// The store was configured with an unusable namespace or rate.
    #[error("invalid configuration for {namespace:?}: {reason}")]
    Configuration { namespace: String, reason: String },

    /// An entry exceeds the item count or key length limit.
    #[error("out of range: <{key}> {reason}")]
    Range { key: String, reason: String },

    /// The host refused an item while an entry was being written out.
    #[error("invalid value type for <{key}>: {reason}")]
    InvalidValueType { key: String, reason: String },

    /// An operation was called with an empty identifier.
    #[error("the identifier is not defined")]
    MissingIdentifier,

    /// The storage location has not been resolved yet.
    #[error("storage location for {0:?} is not initialised")]
    NotInitialised(String),

    /// A host substrate failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Convenience type alias for item store operations.
pub type QidbResult<T> = std::result::Result<T, QidbError>;
