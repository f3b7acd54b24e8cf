use crate::traits::EntityId;

/// Errors reported by host substrates.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The entity does not exist (already removed, or never spawned).
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity has no container.
    #[error("entity {0} has no inventory")]
    NoInventory(EntityId),

    /// Slot index outside the container.
    #[error("slot {slot} out of range for a container of {size} slots")]
    SlotOutOfRange { slot: usize, size: usize },

    /// The host refused to place an item into a slot.
    #[error("item rejected: {0}")]
    RejectedItem(String),

    /// Dynamic property keys and structure ids must not be empty.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing a persisted world.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;
