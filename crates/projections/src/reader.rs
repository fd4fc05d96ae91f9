//! Cache-first read path over the authoritative store.

use std::time::Duration;

use common::{AggregateId, Version};
use domain::ItemState;
use item_store::{ItemRecord, ItemStore, PageRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;
use crate::cache::{Cache, CacheExt, CacheTtls};
use crate::error::CacheError;
use crate::keys;
use crate::model::{ItemPage, StockStatus};

/// Serves item queries from the cache, falling back to the store.
///
/// A miss is read through from the store and written back before
/// returning, unless the cache already holds the same or a newer version.
/// A failing cache is treated as a miss, so reads keep working while the
/// cache is down. Deleted items read as absent.
pub struct ItemReader<S: ItemStore, C: Cache> {
    store: S,
    cache: C,
    ttls: CacheTtls,
}

impl<S: ItemStore, C: Cache> ItemReader<S, C> {
    pub fn new(store: S, cache: C, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// Gets an item by id.
    pub async fn get_item(&self, id: AggregateId) -> Result<Option<ItemState>> {
        let key = keys::item_key(id);
        if let Some(state) = self.cached::<ItemState>(&key).await {
            return Ok(Some(state));
        }

        let state = live_state(self.store.get(id).await?);
        if let Some(state) = &state {
            self.fill_versioned(&key, state, state.version, self.ttls.item)
                .await;
        }
        Ok(state)
    }

    /// Gets an item by SKU.
    pub async fn get_item_by_sku(&self, sku: &str) -> Result<Option<ItemState>> {
        let key = keys::sku_key(sku);
        if let Some(state) = self.cached::<ItemState>(&key).await {
            return Ok(Some(state));
        }

        let state = live_state(self.store.get_by_sku(sku).await?);
        if let Some(state) = &state {
            self.fill_versioned(&key, state, state.version, self.ttls.item)
                .await;
        }
        Ok(state)
    }

    /// Gets the stock figures of an item.
    pub async fn stock_status(&self, id: AggregateId) -> Result<Option<StockStatus>> {
        let key = keys::stock_key(id);
        if let Some(status) = self.cached::<StockStatus>(&key).await {
            return Ok(Some(status));
        }

        let status = live_state(self.store.get(id).await?).map(|state| StockStatus::from(&state));
        if let Some(status) = &status {
            self.fill_versioned(&key, status, status.version, self.ttls.stock)
                .await;
        }
        Ok(status)
    }

    /// Lists live items, one page at a time. Pages are 1-based and the page
    /// size is clamped to `1..=100`.
    pub async fn list_items(&self, page: u32, page_size: u32) -> Result<ItemPage> {
        let request = PageRequest::new(page, page_size);
        let key = keys::list_key(request.page, request.page_size);
        if let Some(page) = self.cached::<ItemPage>(&key).await {
            return Ok(page);
        }

        let items = self
            .store
            .list(request)
            .await?
            .into_iter()
            .map(ItemState::from)
            .collect();
        let page = ItemPage {
            page: request.page,
            page_size: request.page_size,
            items,
        };

        self.fill(&key, &page, self.ttls.list).await;
        Ok(page)
    }

    async fn cached<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        let lookup: std::result::Result<Option<T>, CacheError> = self.cache.get_json(key).await;
        match lookup {
            Ok(Some(value)) => {
                metrics::counter!("cache_reads_total", "result" => "hit").increment(1);
                Some(value)
            }
            Ok(None) => {
                metrics::counter!("cache_reads_total", "result" => "miss").increment(1);
                None
            }
            Err(e) => {
                metrics::counter!("cache_errors_total", "op" => "get").increment(1);
                tracing::warn!(key, error = %e, "cache read failed; reading from store");
                None
            }
        }
    }

    /// Writes back `value` unless a confirmation has meanwhile cached the
    /// same or a later version.
    async fn fill_versioned<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        version: Version,
        ttl: Duration,
    ) {
        match self.cache.get(key).await {
            Ok(Some(raw)) => {
                if let Ok(cached) = serde_json::from_str::<CachedVersion>(&raw)
                    && cached.version >= version
                {
                    tracing::debug!(
                        key,
                        cached = %cached.version,
                        read = %version,
                        "cache already newer; skipping write-back"
                    );
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                metrics::counter!("cache_errors_total", "op" => "get").increment(1);
                tracing::warn!(key, error = %e, "cache read failed; skipping write-back");
                return;
            }
        }

        self.fill(key, value, ttl).await;
    }

    async fn fill<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            metrics::counter!("cache_errors_total", "op" => "set").increment(1);
            tracing::warn!(key, error = %e, "cache write-back failed");
        }
    }
}

/// The version field shared by every per-item cache entry.
#[derive(Deserialize)]
struct CachedVersion {
    version: Version,
}

fn live_state(record: Option<ItemRecord>) -> Option<ItemState> {
    record
        .filter(|record| !record.is_deleted())
        .map(ItemState::from)
}
