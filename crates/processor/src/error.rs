//! Processor error types.

use common::{AggregateId, EventId, Version};
use domain::{DomainError, InventoryError};
use item_store::StoreError;
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur while applying an envelope.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The message is not a valid command-time envelope.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The change breaks an invariant against the authoritative state.
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InventoryError),

    /// The stored version is not the one this attempt expected.
    #[error("Version conflict for item {aggregate_id}: expected {expected}, found {actual}")]
    Conflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The item does not exist in the authoritative store.
    #[error("Item not found: {0}")]
    NotFound(AggregateId),

    /// The item or its SKU already exists.
    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    /// The envelope has already been applied.
    #[error("Envelope already applied: {0}")]
    Duplicate(EventId),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Subscribing or publishing failed.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// The single writer is no longer running.
    #[error("Single writer has stopped")]
    WriterClosed,
}

impl ProcessorError {
    /// Returns true for failures that a fresh attempt may resolve.
    ///
    /// Only version conflicts qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorError::Conflict { .. })
    }
}

impl From<StoreError> for ProcessorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => ProcessorError::Conflict {
                aggregate_id,
                expected,
                actual,
            },
            StoreError::NotFound(id) => ProcessorError::NotFound(id),
            StoreError::AlreadyExists(id) => ProcessorError::AlreadyExists(id.to_string()),
            StoreError::DuplicateSku(sku) => ProcessorError::AlreadyExists(format!("sku {sku}")),
            StoreError::DuplicateEvent(id) => ProcessorError::Duplicate(id),
            other => ProcessorError::Store(other),
        }
    }
}

impl From<DomainError> for ProcessorError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Inventory(e) => ProcessorError::Invariant(e),
            DomainError::Messaging(e) => ProcessorError::Messaging(e),
            DomainError::Store(e) => e.into(),
            other => ProcessorError::Parse(other.to_string()),
        }
    }
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = ProcessorError::from(StoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(3),
            actual: Version::new(4),
        });
        assert!(conflict.is_retryable());

        assert!(!ProcessorError::NotFound(AggregateId::new()).is_retryable());
        assert!(!ProcessorError::Parse("bad".to_string()).is_retryable());
        assert!(!ProcessorError::Invariant(InventoryError::NoChanges).is_retryable());
        assert!(!ProcessorError::WriterClosed.is_retryable());
    }

    #[test]
    fn duplicate_event_maps_to_duplicate() {
        let id = EventId::new();
        assert!(matches!(
            ProcessorError::from(StoreError::DuplicateEvent(id)),
            ProcessorError::Duplicate(d) if d == id
        ));
    }
}
