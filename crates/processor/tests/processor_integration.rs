//! Integration tests for the single-writer processor.
//!
//! The writer tests drive the Pipeline directly; the processor tests run
//! the full EventProcessor against the in-memory bus and store, publishing
//! through the command-side InventoryService.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, EventId, Version};
use domain::{
    Aggregate, AdjustStock, CreateItem, FulfillReservation, InMemoryItemRepository,
    InventoryError, InventoryEvent, InventoryItem, InventoryService, ReleaseStock, ReserveStock,
    UpdateItem,
};
use item_store::{InMemoryItemStore, ItemRecord, ItemStore, ItemStoreExt, PageRequest};
use messaging::{EventBus, EventEnvelope, EventPublisher, EventType, InMemoryEventBus, Topic};
use processor::{
    Applier, ApplyOutcome, DeadLetter, DeadLetterReason, DeadLetterReplayer, EventProcessor,
    Pipeline, ReplayFilter, RetryPolicy, SingleWriter,
};

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(2))
        .max_delay(Duration::from_millis(20))
        .build()
}

/// Store that lets another writer bump the row before the next
/// `conflicts` compare-and-swaps.
struct ConflictingStore {
    inner: InMemoryItemStore,
    conflicts: AtomicU32,
}

impl ConflictingStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryItemStore::new(),
            conflicts: AtomicU32::new(conflicts),
        }
    }

    fn conflicts_left(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemStore for ConflictingStore {
    async fn get(&self, id: AggregateId) -> item_store::Result<Option<ItemRecord>> {
        self.inner.get(id).await
    }

    async fn get_by_sku(&self, sku: &str) -> item_store::Result<Option<ItemRecord>> {
        self.inner.get_by_sku(sku).await
    }

    async fn list(&self, page: PageRequest) -> item_store::Result<Vec<ItemRecord>> {
        self.inner.list(page).await
    }

    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> item_store::Result<()> {
        self.inner.insert(record, event_id).await
    }

    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> item_store::Result<Version> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);

            let mut bumped = self.inner.get_existing(record.id).await?;
            let stale = bumped.version;
            bumped.version = stale.next();
            self.inner
                .update_if_version(&bumped, stale, EventId::new())
                .await?;
        }
        self.inner.update_if_version(record, expected, event_id).await
    }

    async fn has_processed(&self, event_id: EventId) -> item_store::Result<bool> {
        self.inner.has_processed(event_id).await
    }
}

/// Builds command-time envelopes the way the command side would.
struct CommandSide {
    item: InventoryItem,
}

impl CommandSide {
    fn create(quantity: i64) -> (Self, Vec<u8>) {
        let mut side = Self {
            item: InventoryItem::default(),
        };
        let id = AggregateId::new();
        let bytes = side.commit(|item| item.create(id, "SKU-PROC", "Widget", "", quantity));
        (side, bytes)
    }

    fn id(&self) -> AggregateId {
        self.item.id().unwrap()
    }

    fn commit(
        &mut self,
        decide: impl FnOnce(&InventoryItem) -> Result<InventoryEvent, InventoryError>,
    ) -> Vec<u8> {
        let event = decide(&self.item).unwrap();
        let now = Utc::now();
        let version = self.item.commit(&event, now).unwrap();
        let id = self.item.id().unwrap();
        event.to_envelope(id, version, now).unwrap().to_bytes().unwrap()
    }
}

fn pipeline<S: ItemStore + 'static>(
    store: S,
    policy: RetryPolicy,
) -> (Pipeline<InMemoryEventBus>, SingleWriter, InMemoryEventBus) {
    let bus = InMemoryEventBus::new(4);
    let writer = SingleWriter::spawn(Applier::new(store, EventPublisher::new(bus.clone())));
    let pipeline = Pipeline::new(writer.handle(), bus.clone(), policy);
    (pipeline, writer, bus)
}

async fn dead_letters(bus: &InMemoryEventBus) -> Vec<DeadLetter> {
    bus.read_all(Topic::DeadLetter)
        .await
        .unwrap()
        .iter()
        .map(|m| DeadLetter::from_bytes(&m.payload).unwrap())
        .collect()
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

mod writer_semantics {
    use super::*;

    #[tokio::test]
    async fn conflict_is_retried_against_the_fresh_version() {
        let (pipeline, _writer, bus) = pipeline(ConflictingStore::new(1), fast_policy(3));
        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();

        pipeline.process(Topic::ItemLifecycle, &key, &create).await.unwrap();
        let reserve = side.commit(|i| i.reserve_stock(3));
        let outcome = pipeline
            .process(Topic::StockMutation, &key, &reserve)
            .await
            .unwrap();

        // Version 2 went to the competing writer
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                version: Version::new(3),
                confirmation_published: true
            }
        );
        assert!(dead_letters(&bus).await.is_empty());
    }

    #[tokio::test]
    async fn persistent_conflict_exhausts_retries() {
        let (pipeline, _writer, bus) = pipeline(ConflictingStore::new(u32::MAX), fast_policy(2));
        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();

        pipeline.process(Topic::ItemLifecycle, &key, &create).await.unwrap();
        let reserve = side.commit(|i| i.reserve_stock(3));
        let outcome = pipeline
            .process(Topic::StockMutation, &key, &reserve)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::DeadLettered {
                reason: DeadLetterReason::RetriesExhausted
            }
        );
        let letters = dead_letters(&bus).await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 3);
        assert_eq!(letters[0].payload, reserve);
        assert_eq!(letters[0].aggregate_id, Some(side.id()));
    }

    #[tokio::test]
    async fn change_invalid_against_authoritative_state_is_dead_lettered() {
        let store = InMemoryItemStore::new();
        let (pipeline, _writer, bus) = pipeline(store.clone(), fast_policy(3));
        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();
        pipeline.process(Topic::ItemLifecycle, &key, &create).await.unwrap();

        // Two command-side copies both saw 10 available
        let mut stale = CommandSide {
            item: side.item.clone(),
        };
        let first = side.commit(|i| i.reserve_stock(8));
        let second = stale.commit(|i| i.reserve_stock(8));

        pipeline.process(Topic::StockMutation, &key, &first).await.unwrap();
        let outcome = pipeline
            .process(Topic::StockMutation, &key, &second)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::DeadLettered {
                reason: DeadLetterReason::InvariantViolation
            }
        );
        let row = store.get_existing(side.id()).await.unwrap();
        assert_eq!(row.reserved, 8);
        assert_eq!(row.version, Version::new(2));

        let letters = dead_letters(&bus).await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].event_type, Some(EventType::StockReserved));
        assert!(letters[0].error.contains("Insufficient stock"));
    }

    #[tokio::test]
    async fn unparseable_message_is_dead_lettered_verbatim() {
        let (pipeline, _writer, bus) = pipeline(InMemoryItemStore::new(), fast_policy(1));

        let outcome = pipeline
            .process(Topic::StockMutation, "key-1", b"{not json")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::DeadLettered {
                reason: DeadLetterReason::ParseFailure
            }
        );
        let letters = dead_letters(&bus).await;
        assert_eq!(letters[0].payload, b"{not json".to_vec());
        assert_eq!(letters[0].key, "key-1");
        assert_eq!(letters[0].source_topic, Topic::StockMutation);
        assert!(letters[0].event_id.is_none());
    }

    #[tokio::test]
    async fn create_for_existing_sku_is_dead_lettered() {
        let (pipeline, _writer, _bus) = pipeline(InMemoryItemStore::new(), fast_policy(1));
        let (first, create_first) = CommandSide::create(1);
        let (second, create_second) = CommandSide::create(1);

        pipeline
            .process(Topic::ItemLifecycle, &first.id().to_string(), &create_first)
            .await
            .unwrap();
        let outcome = pipeline
            .process(Topic::ItemLifecycle, &second.id().to_string(), &create_second)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::DeadLettered {
                reason: DeadLetterReason::AlreadyExists
            }
        );
    }

    #[tokio::test]
    async fn redelivered_envelope_applies_once() {
        let store = InMemoryItemStore::new();
        let (pipeline, _writer, bus) = pipeline(store.clone(), fast_policy(1));
        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();
        let adjust = side.commit(|i| i.adjust_stock(5));

        pipeline.process(Topic::ItemLifecycle, &key, &create).await.unwrap();
        pipeline.process(Topic::StockMutation, &key, &adjust).await.unwrap();
        let again = pipeline
            .process(Topic::StockMutation, &key, &adjust)
            .await
            .unwrap();

        assert_eq!(again, ApplyOutcome::Duplicate);
        assert_eq!(store.get_existing(side.id()).await.unwrap().quantity, 15);
        assert_eq!(store.processed_count().await, 2);
        // The redelivery confirms the current row again
        assert_eq!(bus.message_count(Topic::Confirmed).await, 3);
    }

    #[tokio::test]
    async fn replay_after_lost_confirmation_confirms_current_state() {
        let store = InMemoryItemStore::new();
        let (pipeline, _writer, bus) = pipeline(store.clone(), fast_policy(1));
        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();
        pipeline.process(Topic::ItemLifecycle, &key, &create).await.unwrap();

        let reserve = side.commit(|i| i.reserve_stock(6));
        bus.fail_next_publishes(1);
        let outcome = pipeline
            .process(Topic::StockMutation, &key, &reserve)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                version: Version::new(2),
                confirmation_published: false
            }
        );
        assert_eq!(bus.message_count(Topic::Confirmed).await, 1);

        let replayed = pipeline
            .process(Topic::StockMutation, &key, &reserve)
            .await
            .unwrap();
        assert_eq!(replayed, ApplyOutcome::Duplicate);

        let confirmations: Vec<EventEnvelope> = bus
            .read_all(Topic::Confirmed)
            .await
            .unwrap()
            .iter()
            .map(|m| EventEnvelope::from_bytes(&m.payload).unwrap())
            .collect();
        assert_eq!(confirmations.len(), 2);
        assert_eq!(confirmations[1].event_type, EventType::StockReservedConfirmed);
        assert_eq!(confirmations[1].aggregate_version(), Some(2));
        assert_eq!(confirmations[1].payload["available"], 4);
        assert_eq!(store.get_existing(side.id()).await.unwrap().reserved, 6);
    }
}

mod event_processor {
    use super::*;

    fn service(
        bus: &InMemoryEventBus,
    ) -> InventoryService<InMemoryItemRepository, InMemoryEventBus> {
        InventoryService::new(InMemoryItemRepository::new(), EventPublisher::new(bus.clone()))
    }

    async fn confirmed_count(bus: &InMemoryEventBus) -> usize {
        bus.message_count(Topic::Confirmed).await
    }

    #[tokio::test]
    async fn command_side_changes_reach_the_authoritative_store() {
        let bus = InMemoryEventBus::new(4);
        let store = InMemoryItemStore::new();
        let processor = EventProcessor::start(store.clone(), bus.clone(), fast_policy(50))
            .await
            .unwrap();
        let service = service(&bus);

        let cmd = CreateItem::new("SKU-E2E", "Widget", 100);
        let id = cmd.item_id;
        service.create_item(cmd).await.unwrap();
        service.reserve_stock(ReserveStock::new(id, 30)).await.unwrap();
        service.release_stock(ReleaseStock::new(id, 10)).await.unwrap();
        service.adjust_stock(AdjustStock::new(id, -5)).await.unwrap();
        service
            .fulfill_reservation(FulfillReservation::new(id, 5))
            .await
            .unwrap();

        eventually(|| async { confirmed_count(&bus).await == 5 }).await;

        let row = store.get_existing(id).await.unwrap();
        assert_eq!(row.quantity, 90);
        assert_eq!(row.reserved, 15);
        assert_eq!(row.version, Version::new(5));

        let local = service.get_item(id).await.unwrap().unwrap();
        assert_eq!(local.quantity(), row.quantity);
        assert_eq!(local.reserved(), row.reserved);

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_delivery_is_applied_once() {
        let bus = InMemoryEventBus::new(2);
        let store = InMemoryItemStore::new();
        let processor = EventProcessor::start(store.clone(), bus.clone(), fast_policy(10))
            .await
            .unwrap();

        let (mut side, create) = CommandSide::create(4);
        let key = side.id().to_string();
        let update = side.commit(|i| i.update_details(Some("Renamed".to_string()), None));

        bus.publish(Topic::ItemLifecycle, &key, create.clone()).await.unwrap();
        bus.publish(Topic::ItemLifecycle, &key, create).await.unwrap();
        bus.publish(Topic::ItemLifecycle, &key, update).await.unwrap();

        // Create, its redelivery, then the update
        eventually(|| async { confirmed_count(&bus).await >= 3 }).await;

        let row = store.get_existing(side.id()).await.unwrap();
        assert_eq!(row.name, "Renamed");
        assert_eq!(row.version, Version::new(2));
        assert_eq!(confirmed_count(&bus).await, 3);
        assert!(dead_letters(&bus).await.is_empty());

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn refused_publish_reaches_the_store_with_the_next_command() {
        let bus = InMemoryEventBus::new(4);
        let store = InMemoryItemStore::new();
        let processor = EventProcessor::start(store.clone(), bus.clone(), fast_policy(5))
            .await
            .unwrap();
        let service = service(&bus);

        let cmd = CreateItem::new("SKU-OUTBOX", "Widget", 20);
        let id = cmd.item_id;
        service.create_item(cmd).await.unwrap();
        eventually(|| async { confirmed_count(&bus).await == 1 }).await;

        bus.fail_next_publishes(1);
        let lost = service.reserve_stock(ReserveStock::new(id, 5)).await.unwrap();
        assert!(!lost.publish.is_published());

        let next = service.reserve_stock(ReserveStock::new(id, 2)).await.unwrap();
        assert!(next.publish.is_published());
        assert_eq!(service.handler().pending_count().await, 0);

        eventually(|| async { confirmed_count(&bus).await == 3 }).await;
        let row = store.get_existing(id).await.unwrap();
        assert_eq!(row.reserved, 7);
        assert_eq!(row.version, Version::new(3));
        assert!(dead_letters(&bus).await.is_empty());

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn dead_letter_replays_once_the_cause_is_fixed() {
        let bus = InMemoryEventBus::new(2);
        let store = InMemoryItemStore::new();
        let processor = EventProcessor::start(store.clone(), bus.clone(), fast_policy(1))
            .await
            .unwrap();
        let id = AggregateId::new();

        // No aggregateVersion: an unknown item is simply not found
        let reserve = EventEnvelope::builder()
            .event_type(EventType::StockReserved)
            .aggregate_id(id)
            .payload_raw(serde_json::json!({"quantity": 2}))
            .build()
            .unwrap();
        bus.publish(Topic::StockMutation, &id.to_string(), reserve.to_bytes().unwrap())
            .await
            .unwrap();
        eventually(|| async { bus.message_count(Topic::DeadLetter).await == 1 }).await;

        service(&bus)
            .create_item(CreateItem::new("SKU-LATE", "Late", 5).with_id(id))
            .await
            .unwrap();
        eventually(|| async { confirmed_count(&bus).await == 1 }).await;

        let replayer = DeadLetterReplayer::new(bus.clone());
        let filter = ReplayFilter::all().with_reason(DeadLetterReason::NotFound);
        assert_eq!(replayer.list(&filter).await.unwrap().len(), 1);
        let report = replayer.replay(&filter).await.unwrap();
        assert_eq!(report.replayed, 1);

        eventually(|| async { confirmed_count(&bus).await == 2 }).await;
        let row = store.get_existing(id).await.unwrap();
        assert_eq!(row.reserved, 2);
        assert_eq!(row.version, Version::new(2));

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn lifecycle_updates_are_confirmed_with_full_state() {
        let bus = InMemoryEventBus::new(4);
        let store = InMemoryItemStore::new();
        let processor = EventProcessor::start(store.clone(), bus.clone(), fast_policy(50))
            .await
            .unwrap();
        let service = service(&bus);

        let cmd = CreateItem::new("SKU-CONF", "Widget", 3);
        let id = cmd.item_id;
        service.create_item(cmd).await.unwrap();
        service
            .update_item(UpdateItem::new(id).with_description("Blue"))
            .await
            .unwrap();

        eventually(|| async { confirmed_count(&bus).await == 2 }).await;

        let confirmations: Vec<EventEnvelope> = bus
            .read_all(Topic::Confirmed)
            .await
            .unwrap()
            .iter()
            .map(|m| EventEnvelope::from_bytes(&m.payload).unwrap())
            .collect();
        assert_eq!(confirmations[0].event_type, EventType::ItemCreatedConfirmed);
        assert_eq!(confirmations[1].event_type, EventType::ItemUpdatedConfirmed);
        assert_eq!(confirmations[1].aggregate_version(), Some(2));
        assert_eq!(confirmations[1].payload["description"], "Blue");
        assert_eq!(confirmations[1].payload["available"], 3);

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_a_retry_in_backoff() {
        let bus = InMemoryEventBus::new(2);
        let store = Arc::new(ConflictingStore::new(1));
        let backoff = Duration::from_millis(300);
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(backoff)
            .max_delay(backoff)
            .build();
        let processor = EventProcessor::start(Arc::clone(&store), bus.clone(), policy)
            .await
            .unwrap();

        let (mut side, create) = CommandSide::create(10);
        let key = side.id().to_string();
        bus.publish(Topic::ItemLifecycle, &key, create).await.unwrap();
        eventually(|| async { confirmed_count(&bus).await == 1 }).await;

        let reserve = side.commit(|i| i.reserve_stock(3));
        bus.publish(Topic::StockMutation, &key, reserve).await.unwrap();

        // The first attempt lost the race and the retry is sleeping
        eventually(|| async { store.conflicts_left() == 0 }).await;
        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), processor.shutdown())
            .await
            .expect("shutdown hung");

        assert!(started.elapsed() >= backoff / 2);
        let row = store.get_existing(side.id()).await.unwrap();
        assert_eq!(row.reserved, 3);
        assert_eq!(row.version, Version::new(3));
        assert_eq!(confirmed_count(&bus).await, 2);
        assert!(dead_letters(&bus).await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_every_consumer() {
        let bus = InMemoryEventBus::new(3);
        let processor = EventProcessor::start(InMemoryItemStore::new(), bus, RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(processor.consumer_count(), 6);

        tokio::time::timeout(Duration::from_secs(2), processor.shutdown())
            .await
            .expect("shutdown hung");
    }
}
