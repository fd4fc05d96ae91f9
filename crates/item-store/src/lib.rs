//! Authoritative storage for inventory items.
//!
//! The store holds one row per item and is mutated only through
//! version-checked writes. Each write is tagged with the id of the envelope
//! that produced it so that redelivered envelopes are applied at most once.

pub mod error;
pub mod memory;
pub mod page;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{AggregateId, EventId, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryItemStore;
pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageRequest};
pub use postgres::PostgresItemStore;
pub use record::ItemRecord;
pub use store::{ItemStore, ItemStoreExt};
