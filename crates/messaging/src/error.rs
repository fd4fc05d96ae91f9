use thiserror::Error;

use crate::Topic;

/// Errors raised while building, encoding or transporting envelopes.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker refused or failed to accept a message.
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: Topic, reason: String },

    /// A subscription could not be established.
    #[error("Subscription to {topic} failed: {reason}")]
    SubscriptionFailed { topic: Topic, reason: String },

    /// The envelope was written by a newer producer than this consumer understands.
    #[error("Unsupported schema version {found} (supported up to {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    /// A required envelope field was not set on the builder.
    #[error("Envelope is missing required field: {0}")]
    MissingField(&'static str),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
