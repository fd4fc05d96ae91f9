//! Command-side copy of the inventory items.

use async_trait::async_trait;
use common::{AggregateId, EventId, Version};
use item_store::{InMemoryItemStore, ItemRecord, ItemStore, PageRequest, StoreError};

use crate::error::DomainError;

use super::InventoryItem;

/// Storage for the command side's local copy of the items.
///
/// Saves are version-checked: a save whose `expected` version no longer
/// matches fails with `ConcurrencyConflict`. Any [`ItemStore`] can serve
/// as the repository.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Loads an item, including deleted ones.
    async fn load(&self, id: AggregateId) -> Result<Option<InventoryItem>, DomainError>;

    /// Loads an item by SKU, including deleted ones.
    async fn load_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>, DomainError>;

    /// Saves an item that was at `expected` before the change.
    ///
    /// `Version::initial()` means the item is new and is inserted.
    async fn save(
        &self,
        item: &InventoryItem,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version, DomainError>;
}

#[async_trait]
impl<S: ItemStore + ?Sized> ItemRepository for S {
    async fn load(&self, id: AggregateId) -> Result<Option<InventoryItem>, DomainError> {
        Ok(self.get(id).await?.map(InventoryItem::from))
    }

    async fn load_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>, DomainError> {
        Ok(self.get_by_sku(sku).await?.map(InventoryItem::from))
    }

    async fn save(
        &self,
        item: &InventoryItem,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version, DomainError> {
        let record = item.to_record()?;

        if expected == Version::initial() {
            self.insert(&record, event_id).await?;
            Ok(record.version)
        } else {
            Ok(self.update_if_version(&record, expected, event_id).await?)
        }
    }
}

/// In-memory command-side repository.
pub type InMemoryItemRepository = InMemoryItemStore;

/// In-memory command-side copy that falls back to an authoritative store.
///
/// An item missing from the copy is read from `source` and copied in on
/// first load, so items that existed before the process started can be
/// changed. Writes only touch the copy; `source` is never mutated.
#[derive(Clone)]
pub struct SeededItemRepository<S> {
    local: InMemoryItemStore,
    source: S,
}

impl<S: ItemStore> SeededItemRepository<S> {
    pub fn new(source: S) -> Self {
        Self {
            local: InMemoryItemStore::new(),
            source,
        }
    }

    /// Returns the local copy.
    pub fn local(&self) -> &InMemoryItemStore {
        &self.local
    }

    async fn seed(&self, found: Option<ItemRecord>) -> item_store::Result<Option<ItemRecord>> {
        let Some(record) = found else {
            return Ok(None);
        };

        match self.local.insert(&record, EventId::new()).await {
            Ok(()) => {
                tracing::debug!(
                    aggregate_id = %record.id,
                    version = %record.version,
                    "seeded command-side copy from store"
                );
                Ok(Some(record))
            }
            // A concurrent load got there first
            Err(StoreError::AlreadyExists(_)) | Err(StoreError::DuplicateSku(_)) => {
                self.local.get(record.id).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: ItemStore> ItemStore for SeededItemRepository<S> {
    async fn get(&self, id: AggregateId) -> item_store::Result<Option<ItemRecord>> {
        if let Some(record) = self.local.get(id).await? {
            return Ok(Some(record));
        }
        let found = self.source.get(id).await?;
        self.seed(found).await
    }

    async fn get_by_sku(&self, sku: &str) -> item_store::Result<Option<ItemRecord>> {
        if let Some(record) = self.local.get_by_sku(sku).await? {
            return Ok(Some(record));
        }
        let found = self.source.get_by_sku(sku).await?;
        self.seed(found).await
    }

    async fn list(&self, page: PageRequest) -> item_store::Result<Vec<ItemRecord>> {
        self.local.list(page).await
    }

    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> item_store::Result<()> {
        // The copy may not have seen every item the store holds
        if self.source.get(record.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(record.id));
        }
        if self.source.get_by_sku(&record.sku).await?.is_some() {
            return Err(StoreError::DuplicateSku(record.sku.clone()));
        }
        self.local.insert(record, event_id).await
    }

    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> item_store::Result<Version> {
        self.local.update_if_version(record, expected, event_id).await
    }

    async fn has_processed(&self, event_id: EventId) -> item_store::Result<bool> {
        self.local.has_processed(event_id).await
    }
}
