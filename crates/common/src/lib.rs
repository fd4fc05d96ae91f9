//! Identifier and version types shared by every role of the inventory sync system.

mod types;

pub use types::{AggregateId, EventId, Version};
