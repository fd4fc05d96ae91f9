//! Event transport for the inventory sync system.
//!
//! - [`EventEnvelope`] and its builder: the immutable, versioned wire message
//! - [`Topic`]: topics partitioned by business concern
//! - [`EventBus`]: the append-only partitioned log, with [`InMemoryEventBus`]
//! - [`EventPublisher`]: routes envelopes by type and keys them by aggregate id

pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod topic;

pub use bus::{BusMessage, Delivery, EventBus, MessageStream, PartitionStream, partition_for};
pub use common::{AggregateId, EventId, Version};
pub use envelope::{
    EventEnvelope, EventEnvelopeBuilder, EventType, META_AGGREGATE_VERSION, META_CAUSATION_ID,
    META_CORRELATION_ID, SCHEMA_VERSION,
};
pub use error::{MessagingError, Result};
pub use memory::InMemoryEventBus;
pub use publisher::EventPublisher;
pub use topic::Topic;
