use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventId, ItemRecord, PageRequest, Result, StoreError, Version, store::ItemStore,
};

#[derive(Default)]
struct State {
    rows: HashMap<AggregateId, ItemRecord>,
    sku_index: HashMap<String, AggregateId>,
    processed: HashSet<EventId>,
}

impl State {
    fn check_constraints(record: &ItemRecord) -> Result<()> {
        match record.violated_constraint() {
            Some(constraint) => Err(StoreError::ConstraintViolation {
                aggregate_id: record.id,
                constraint: constraint.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory item store.
///
/// Enforces the same constraints as the PostgreSQL schema: unique id,
/// unique SKU, stock checks and one application per envelope id.
#[derive(Clone, Default)]
pub struct InMemoryItemStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryItemStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows, deleted ones included.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Returns the number of recorded envelope ids.
    pub async fn processed_count(&self) -> usize {
        self.state.read().await.processed.len()
    }

    /// Clears all rows and processed ids.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.rows.clear();
        state.sku_index.clear();
        state.processed.clear();
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get(&self, id: AggregateId) -> Result<Option<ItemRecord>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<ItemRecord>> {
        let state = self.state.read().await;
        Ok(state
            .sku_index
            .get(sku)
            .and_then(|id| state.rows.get(id))
            .cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<Vec<ItemRecord>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|r| !r.is_deleted())
            .cloned()
            .collect();

        // Same ordering as the listing index in PostgreSQL
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> Result<()> {
        let mut state = self.state.write().await;

        if state.processed.contains(&event_id) {
            return Err(StoreError::DuplicateEvent(event_id));
        }
        if state.rows.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        if state.sku_index.contains_key(&record.sku) {
            return Err(StoreError::DuplicateSku(record.sku.clone()));
        }
        State::check_constraints(record)?;

        state.sku_index.insert(record.sku.clone(), record.id);
        state.rows.insert(record.id, record.clone());
        state.processed.insert(event_id);
        Ok(())
    }

    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version> {
        let mut state = self.state.write().await;

        if state.processed.contains(&event_id) {
            return Err(StoreError::DuplicateEvent(event_id));
        }

        let current = state
            .rows
            .get(&record.id)
            .ok_or(StoreError::NotFound(record.id))?;

        // WHERE id = ? AND version = ?
        if current.version != expected {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected,
                actual: current.version,
            });
        }
        State::check_constraints(record)?;

        state.rows.insert(record.id, record.clone());
        state.processed.insert(event_id);
        Ok(record.version)
    }

    async fn has_processed(&self, event_id: EventId) -> Result<bool> {
        Ok(self.state.read().await.processed.contains(&event_id))
    }
}
