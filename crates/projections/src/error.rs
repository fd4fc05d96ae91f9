//! Cache and projection error types.

use thiserror::Error;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis backend failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The cache cannot be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The cache failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The authoritative store failed.
    #[error("Store error: {0}")]
    Store(#[from] item_store::StoreError),

    /// Subscribing to or decoding from the bus failed.
    #[error("Messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
