//! Command handling infrastructure.

use std::collections::VecDeque;

use chrono::Utc;
use common::AggregateId;
use messaging::{EventBus, EventEnvelope, EventPublisher, MessagingError};
use tokio::sync::Mutex;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::item::{InventoryError, InventoryEvent, InventoryItem, ItemRepository};

/// Outcome of handing the envelope to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// The bus accepted the envelope.
    Published { partition: u32, offset: u64 },

    /// The bus refused the envelope, or an earlier refused one. The local
    /// change stands and the envelope waits in the outbox.
    Failed(String),
}

impl PublishStatus {
    /// Returns true if the envelope reached the bus.
    pub fn is_published(&self) -> bool {
        matches!(self, PublishStatus::Published { .. })
    }
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// The item after the change.
    pub item: InventoryItem,

    /// The envelope describing the change.
    pub envelope: EventEnvelope,

    /// Whether the envelope was published.
    pub publish: PublishStatus,
}

/// Trait for commands that can be executed against an item.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the item's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// Short name used in logs and metrics.
    fn command_name(&self) -> &'static str;

    /// Returns the ID of the item this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Handler for executing commands against the command-side copy.
///
/// The handler is responsible for:
/// 1. Loading the item from the repository
/// 2. Deciding the event and committing it to the local copy
/// 3. Saving the copy with a version check
/// 4. Publishing the envelope
///
/// A publish failure is reported in [`CommandResult::publish`] and does not
/// undo the saved change. The refused envelope is kept in an outbox and
/// published, in commit order, before any later envelope.
pub struct CommandHandler<R, B>
where
    R: ItemRepository,
    B: EventBus,
{
    repository: R,
    publisher: EventPublisher<B>,
    outbox: Mutex<VecDeque<EventEnvelope>>,
}

impl<R, B> CommandHandler<R, B>
where
    R: ItemRepository,
    B: EventBus,
{
    /// Creates a new command handler.
    pub fn new(repository: R, publisher: EventPublisher<B>) -> Self {
        Self {
            repository,
            publisher,
            outbox: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns a reference to the publisher.
    pub fn publisher(&self) -> &EventPublisher<B> {
        &self.publisher
    }

    /// Loads an item, returning None if it doesn't exist.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<Option<InventoryItem>, DomainError> {
        self.repository.load(aggregate_id).await
    }

    /// Returns the number of committed envelopes still waiting for the bus.
    pub async fn pending_count(&self) -> usize {
        self.outbox.lock().await.len()
    }

    /// Publishes the envelopes the bus refused earlier, oldest first.
    ///
    /// Stops at the first refusal, leaving it and everything after it
    /// queued. Returns how many envelopes were published.
    pub async fn publish_pending(&self) -> Result<usize, DomainError> {
        let mut outbox = self.outbox.lock().await;
        let published = self.drain(&mut outbox).await;
        metrics::gauge!("command_outbox_pending").set(outbox.len() as f64);
        published.map_err(DomainError::from)
    }

    /// Executes a command.
    ///
    /// The decide function receives the current item (a default one if the
    /// item doesn't exist) and returns the event to commit, or an error.
    pub async fn execute<C, F>(&self, command: &C, decide: F) -> Result<CommandResult, DomainError>
    where
        C: Command,
        F: FnOnce(&InventoryItem) -> Result<InventoryEvent, InventoryError>,
    {
        let result = self.try_execute(command.aggregate_id(), decide).await;

        let outcome = match &result {
            Ok(r) if r.publish.is_published() => "ok",
            Ok(_) => "publish_failed",
            Err(DomainError::Inventory(_)) | Err(DomainError::NotFound(_)) => "rejected",
            Err(DomainError::ConcurrencyConflict { .. }) => "conflict",
            Err(_) => "error",
        };
        metrics::counter!(
            "commands_total",
            "command" => command.command_name(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    async fn try_execute<F>(
        &self,
        aggregate_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult, DomainError>
    where
        F: FnOnce(&InventoryItem) -> Result<InventoryEvent, InventoryError>,
    {
        let mut item = self.repository.load(aggregate_id).await?.unwrap_or_default();
        let expected = item.version();

        let event = decide(&item).map_err(|e| match e {
            InventoryError::NotCreated => DomainError::NotFound(aggregate_id),
            e => DomainError::Inventory(e),
        })?;

        let now = Utc::now();
        let version = item.commit(&event, now)?;
        let envelope = event.to_envelope(aggregate_id, version, now)?;

        self.repository
            .save(&item, expected, envelope.event_id)
            .await?;

        tracing::debug!(
            aggregate_type = InventoryItem::aggregate_type(),
            %aggregate_id,
            event_type = %envelope.event_type,
            %version,
            "command committed locally"
        );

        let publish = self.publish_in_order(&envelope).await;

        Ok(CommandResult {
            item,
            envelope,
            publish,
        })
    }

    /// Publishes `envelope` after everything already in the outbox.
    async fn publish_in_order(&self, envelope: &EventEnvelope) -> PublishStatus {
        let mut outbox = self.outbox.lock().await;

        let result = match self.drain(&mut outbox).await {
            Ok(_) => self.publisher.publish(envelope).await,
            Err(e) => Err(e),
        };

        let status = match result {
            Ok(delivery) => PublishStatus::Published {
                partition: delivery.partition,
                offset: delivery.offset,
            },
            Err(e) => {
                tracing::error!(
                    aggregate_id = %envelope.aggregate_id,
                    event_id = %envelope.event_id,
                    pending = outbox.len() + 1,
                    error = %e,
                    "failed to publish envelope; local change kept"
                );
                outbox.push_back(envelope.clone());
                PublishStatus::Failed(e.to_string())
            }
        };
        metrics::gauge!("command_outbox_pending").set(outbox.len() as f64);

        status
    }

    async fn drain(&self, outbox: &mut VecDeque<EventEnvelope>) -> Result<usize, MessagingError> {
        let mut published = 0;
        while let Some(envelope) = outbox.front() {
            self.publisher.publish(envelope).await?;
            tracing::info!(
                aggregate_id = %envelope.aggregate_id,
                event_id = %envelope.event_id,
                "published envelope from outbox"
            );
            outbox.pop_front();
            published += 1;
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{CreateItem, InMemoryItemRepository, ReserveStock};
    use common::Version;
    use messaging::{EventType, InMemoryEventBus, Topic};

    fn handler() -> (
        CommandHandler<InMemoryItemRepository, InMemoryEventBus>,
        InMemoryEventBus,
    ) {
        let bus = InMemoryEventBus::new(4);
        let handler = CommandHandler::new(
            InMemoryItemRepository::new(),
            EventPublisher::new(bus.clone()),
        );
        (handler, bus)
    }

    async fn create(
        handler: &CommandHandler<InMemoryItemRepository, InMemoryEventBus>,
        quantity: i64,
    ) -> AggregateId {
        let cmd = CreateItem::new("SKU-1", "Widget", quantity);
        let id = cmd.item_id;
        handler
            .execute(&cmd, |item| {
                item.create(id, &cmd.sku, &cmd.name, &cmd.description, cmd.quantity)
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn execute_commits_saves_and_publishes() {
        let (handler, bus) = handler();
        let id = create(&handler, 10).await;

        let cmd = ReserveStock::new(id, 3);
        let result = handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
            .unwrap();

        assert_eq!(result.item.version(), Version::new(2));
        assert_eq!(result.item.reserved(), 3);
        assert_eq!(result.envelope.event_type, EventType::StockReserved);
        assert_eq!(result.envelope.aggregate_version(), Some(2));
        assert!(result.publish.is_published());

        let saved = handler.load(id).await.unwrap().unwrap();
        assert_eq!(saved, result.item);
        assert_eq!(bus.message_count(Topic::ItemLifecycle).await, 1);
        assert_eq!(bus.message_count(Topic::StockMutation).await, 1);
    }

    #[tokio::test]
    async fn rejected_command_changes_nothing() {
        let (handler, bus) = handler();
        let id = create(&handler, 5).await;

        let cmd = ReserveStock::new(id, 6);
        let err = handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Inventory(InventoryError::InsufficientStock { .. })
        ));
        assert_eq!(handler.load(id).await.unwrap().unwrap().version(), Version::first());
        assert_eq!(bus.message_count(Topic::StockMutation).await, 0);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let (handler, _) = handler();
        let cmd = ReserveStock::new(AggregateId::new(), 1);

        let err = handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(id) if id == cmd.item_id));
    }

    #[tokio::test]
    async fn publish_failure_keeps_local_change() {
        let (handler, bus) = handler();
        let id = create(&handler, 10).await;
        bus.fail_next_publishes(1);

        let cmd = ReserveStock::new(id, 2);
        let result = handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
            .unwrap();

        assert!(matches!(result.publish, PublishStatus::Failed(_)));
        assert_eq!(handler.load(id).await.unwrap().unwrap().reserved(), 2);
        assert_eq!(bus.message_count(Topic::StockMutation).await, 0);
        assert_eq!(handler.pending_count().await, 1);
    }

    fn stock_versions(messages: &[messaging::BusMessage]) -> Vec<Option<i64>> {
        messages
            .iter()
            .map(|m| EventEnvelope::from_bytes(&m.payload).unwrap().aggregate_version())
            .collect()
    }

    #[tokio::test]
    async fn next_command_publishes_refused_envelope_first() {
        let (handler, bus) = handler();
        let id = create(&handler, 10).await;

        bus.fail_next_publishes(1);
        let first = ReserveStock::new(id, 2);
        handler
            .execute(&first, |item| item.reserve_stock(first.quantity))
            .await
            .unwrap();

        let second = ReserveStock::new(id, 3);
        let result = handler
            .execute(&second, |item| item.reserve_stock(second.quantity))
            .await
            .unwrap();

        assert!(result.publish.is_published());
        assert_eq!(handler.pending_count().await, 0);
        let published = bus.read_all(Topic::StockMutation).await.unwrap();
        assert_eq!(stock_versions(&published), vec![Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn refused_outbox_holds_back_later_envelopes() {
        let (handler, bus) = handler();
        let id = create(&handler, 10).await;

        bus.fail_next_publishes(1);
        let first = ReserveStock::new(id, 1);
        handler
            .execute(&first, |item| item.reserve_stock(first.quantity))
            .await
            .unwrap();

        // The outbox retry is refused, so the new envelope queues behind it
        bus.fail_next_publishes(1);
        let second = ReserveStock::new(id, 1);
        let result = handler
            .execute(&second, |item| item.reserve_stock(second.quantity))
            .await
            .unwrap();
        assert!(matches!(result.publish, PublishStatus::Failed(_)));
        assert_eq!(handler.pending_count().await, 2);
        assert_eq!(bus.message_count(Topic::StockMutation).await, 0);

        assert_eq!(handler.publish_pending().await.unwrap(), 2);
        assert_eq!(handler.pending_count().await, 0);
        let published = bus.read_all(Topic::StockMutation).await.unwrap();
        assert_eq!(stock_versions(&published), vec![Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn publish_pending_keeps_envelopes_the_bus_still_refuses() {
        let (handler, bus) = handler();
        let id = create(&handler, 10).await;

        bus.fail_next_publishes(1);
        let cmd = ReserveStock::new(id, 4);
        handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
            .unwrap();

        bus.fail_next_publishes(1);
        let err = handler.publish_pending().await.unwrap_err();
        assert!(matches!(err, DomainError::Messaging(_)));
        assert_eq!(handler.pending_count().await, 1);

        assert_eq!(handler.publish_pending().await.unwrap(), 1);
        assert_eq!(handler.publish_pending().await.unwrap(), 0);
        assert_eq!(bus.message_count(Topic::StockMutation).await, 1);
    }
}
