use thiserror::Error;

use crate::{AggregateId, EventId, Version};

/// Errors that can occur when interacting with the item store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version did not match the version the caller read.
    #[error(
        "Concurrency conflict for item {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The item does not exist.
    #[error("Item not found: {0}")]
    NotFound(AggregateId),

    /// An item with this id already exists.
    #[error("Item already exists: {0}")]
    AlreadyExists(AggregateId),

    /// Another item already uses this SKU.
    #[error("SKU already in use: {0}")]
    DuplicateSku(String),

    /// The envelope has already been applied.
    #[error("Event already applied: {0}")]
    DuplicateEvent(EventId),

    /// The row would break a stock invariant enforced by the store.
    #[error("Stock constraint violated for item {aggregate_id}: {constraint}")]
    ConstraintViolation {
        aggregate_id: AggregateId,
        constraint: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Short outcome name used as a metric label.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::ConcurrencyConflict { .. } => "conflict",
            StoreError::NotFound(_) => "not_found",
            StoreError::AlreadyExists(_) | StoreError::DuplicateSku(_) => "already_exists",
            StoreError::DuplicateEvent(_) => "duplicate",
            StoreError::ConstraintViolation { .. } => "constraint",
            StoreError::Database(_) | StoreError::Migration(_) => "error",
        }
    }
}

/// Result type for item store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_group_expected_outcomes() {
        let id = AggregateId::new();
        let conflict = StoreError::ConcurrencyConflict {
            aggregate_id: id,
            expected: Version::first(),
            actual: Version::new(2),
        };

        assert_eq!(conflict.label(), "conflict");
        assert_eq!(StoreError::DuplicateSku("SKU-1".into()).label(), "already_exists");
        assert_eq!(StoreError::AlreadyExists(id).label(), "already_exists");
        assert_eq!(StoreError::DuplicateEvent(EventId::new()).label(), "duplicate");
        assert_eq!(StoreError::Database(sqlx::Error::PoolTimedOut).label(), "error");
    }
}
