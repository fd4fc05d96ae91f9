//! Keeps the read-side cache in step with confirmed changes.

use std::sync::Arc;

use async_trait::async_trait;
use domain::ItemState;
use messaging::{EventEnvelope, EventType};
use tokio::sync::RwLock;

use crate::cache::{Cache, CacheExt, CacheTtls};
use crate::keys;
use crate::model::StockStatus;
use crate::projection::{Projection, ProjectionPosition};
use crate::{ProjectionError, Result};

/// Projection that writes confirmed item state into the cache.
///
/// Only `*Confirmed` envelopes are acted on; command-time envelopes carry
/// provisional data and are ignored. A confirmation carries the full
/// post-change state, so the id, SKU and stock entries are overwritten
/// rather than patched, and every list page is invalidated. An envelope
/// older than the cached entry is skipped, which makes replays harmless.
pub struct CacheSynchronizer<C: Cache> {
    cache: C,
    ttls: CacheTtls,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl<C: Cache> CacheSynchronizer<C> {
    pub fn new(cache: C, ttls: CacheTtls) -> Self {
        Self {
            cache,
            ttls,
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    async fn sync(&self, envelope: &EventEnvelope) -> Result<&'static str> {
        if !envelope.event_type.is_confirmation() {
            return Ok("ignored");
        }

        let state: ItemState = envelope.payload_as()?;
        if state.id != envelope.aggregate_id {
            return Err(ProjectionError::Projection(format!(
                "confirmation for {} carries state of {}",
                envelope.aggregate_id, state.id
            )));
        }

        let item_key = keys::item_key(state.id);

        if envelope.event_type == EventType::ItemDeletedConfirmed || state.is_deleted() {
            self.cache
                .delete(&[
                    item_key,
                    keys::sku_key(&state.sku),
                    keys::stock_key(state.id),
                ])
                .await?;
            self.invalidate_lists().await?;
            return Ok("deleted");
        }

        if let Some(cached) = self.cached_version(&item_key).await?
            && cached > state.version
        {
            tracing::debug!(
                aggregate_id = %state.id,
                cached = %cached,
                incoming = %state.version,
                "skipping stale confirmation"
            );
            return Ok("stale");
        }

        if let Err(e) = self.write_entries(&state).await {
            self.evict(&state).await;
            return Err(e);
        }
        self.invalidate_lists().await?;

        Ok("applied")
    }

    async fn write_entries(&self, state: &ItemState) -> Result<()> {
        self.cache
            .set_json(&keys::item_key(state.id), state, self.ttls.item)
            .await?;
        self.cache
            .set_json(&keys::sku_key(&state.sku), state, self.ttls.item)
            .await?;
        self.cache
            .set_json(
                &keys::stock_key(state.id),
                &StockStatus::from(state),
                self.ttls.stock,
            )
            .await?;
        Ok(())
    }

    /// Drops every entry of the item after a partial write, so the keys
    /// never disagree. Readers then fall through to the store.
    async fn evict(&self, state: &ItemState) {
        let entries = [
            keys::item_key(state.id),
            keys::sku_key(&state.sku),
            keys::stock_key(state.id),
        ];
        if let Err(e) = self.cache.delete(&entries).await {
            tracing::error!(
                aggregate_id = %state.id,
                error = %e,
                "failed to evict partially written cache entries"
            );
        }
    }

    /// Version of the cached entry. An undecodable entry counts as absent.
    async fn cached_version(&self, key: &str) -> Result<Option<common::Version>> {
        Ok(self
            .cache
            .get(key)
            .await?
            .and_then(|raw| serde_json::from_str::<ItemState>(&raw).ok())
            .map(|state| state.version))
    }

    async fn invalidate_lists(&self) -> Result<()> {
        self.cache.delete_prefix(keys::LIST_PREFIX).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: Cache> Projection for CacheSynchronizer<C> {
    fn name(&self) -> &'static str {
        "CacheSynchronizer"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let outcome = match self.sync(envelope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("cache_sync_events_total", "outcome" => "error").increment(1);
                return Err(e);
            }
        };
        metrics::counter!("cache_sync_events_total", "outcome" => outcome).increment(1);

        let mut pos = self.position.write().await;
        *pos = pos.advance(envelope);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        for prefix in keys::ALL_PREFIXES {
            self.cache.delete_prefix(prefix).await?;
        }
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}
