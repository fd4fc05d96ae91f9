use async_trait::async_trait;

use crate::{AggregateId, EventId, ItemRecord, PageRequest, Result, StoreError, Version};

/// The authoritative item store.
///
/// Only the single writer mutates it. Every mutation is tagged with the id
/// of the envelope that caused it; the id is recorded atomically with the
/// row change and a second mutation with the same id is rejected with
/// [`StoreError::DuplicateEvent`].
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Loads a row by id, including deleted rows.
    async fn get(&self, id: AggregateId) -> Result<Option<ItemRecord>>;

    /// Loads a row by SKU, including deleted rows.
    async fn get_by_sku(&self, sku: &str) -> Result<Option<ItemRecord>>;

    /// Lists live rows ordered by creation time, then id.
    async fn list(&self, page: PageRequest) -> Result<Vec<ItemRecord>>;

    /// Inserts a new row.
    ///
    /// Fails with `AlreadyExists` if the id is taken and `DuplicateSku` if
    /// the SKU is taken.
    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> Result<()>;

    /// Replaces a row if, and only if, its stored version equals `expected`.
    ///
    /// This is the compare-and-swap of the optimistic lock: a stale
    /// `expected` yields `ConcurrencyConflict` and leaves the row untouched.
    /// Returns the version written.
    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version>;

    /// Returns true if a mutation tagged with `event_id` has been applied.
    async fn has_processed(&self, event_id: EventId) -> Result<bool>;
}

/// Extension trait providing convenience methods for item stores.
#[async_trait]
pub trait ItemStoreExt: ItemStore {
    /// Loads a row, failing with `NotFound` when it does not exist.
    async fn get_existing(&self, id: AggregateId) -> Result<ItemRecord> {
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Returns the stored version of an item, or `None` if it does not exist.
    async fn current_version(&self, id: AggregateId) -> Result<Option<Version>> {
        Ok(self.get(id).await?.map(|r| r.version))
    }
}

// Blanket implementation for all ItemStore implementations
impl<T: ItemStore + ?Sized> ItemStoreExt for T {}

#[async_trait]
impl<T: ItemStore + ?Sized> ItemStore for std::sync::Arc<T> {
    async fn get(&self, id: AggregateId) -> Result<Option<ItemRecord>> {
        (**self).get(id).await
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<ItemRecord>> {
        (**self).get_by_sku(sku).await
    }

    async fn list(&self, page: PageRequest) -> Result<Vec<ItemRecord>> {
        (**self).list(page).await
    }

    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> Result<()> {
        (**self).insert(record, event_id).await
    }

    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version> {
        (**self).update_if_version(record, expected, event_id).await
    }

    async fn has_processed(&self, event_id: EventId) -> Result<bool> {
        (**self).has_processed(event_id).await
    }
}
