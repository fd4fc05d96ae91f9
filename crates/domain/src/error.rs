//! Domain error types.

use common::{AggregateId, Version};
use item_store::StoreError;
use messaging::{EventType, MessagingError};
use thiserror::Error;

use crate::item::InventoryError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The item rejected the change.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The item does not exist.
    #[error("Item not found: {0}")]
    NotFound(AggregateId),

    /// An item with this id already exists.
    #[error("Item already exists: {0}")]
    AlreadyExists(AggregateId),

    /// Another item already uses this SKU.
    #[error("SKU already in use: {0}")]
    DuplicateSku(String),

    /// The local copy changed between load and save.
    #[error(
        "Concurrency conflict for item {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// An error occurred in the item store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// An envelope could not be built or published.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The envelope does not carry a command-time event.
    #[error("Unexpected event type: {0}")]
    UnexpectedEventType(EventType),

    /// A creation payload names a different item than its envelope.
    #[error("Envelope is for item {envelope} but payload is for item {payload}")]
    AggregateMismatch {
        envelope: AggregateId,
        payload: AggregateId,
    },
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => DomainError::NotFound(id),
            StoreError::AlreadyExists(id) => DomainError::AlreadyExists(id),
            StoreError::DuplicateSku(sku) => DomainError::DuplicateSku(sku),
            StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            other => DomainError::Store(other),
        }
    }
}
