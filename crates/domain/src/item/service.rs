//! Inventory service providing a simplified API for item operations.

use common::AggregateId;
use messaging::{EventBus, EventPublisher};

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    AdjustStock, CreateItem, DeleteItem, FulfillReservation, InventoryItem, ItemRepository,
    ReleaseStock, ReserveStock, UpdateItem,
};

/// Service for managing inventory items on the command side.
///
/// Provides a high-level API for item operations, wrapping the command handler.
pub struct InventoryService<R: ItemRepository, B: EventBus> {
    handler: CommandHandler<R, B>,
}

impl<R: ItemRepository, B: EventBus> InventoryService<R, B> {
    /// Creates a new inventory service.
    pub fn new(repository: R, publisher: EventPublisher<B>) -> Self {
        Self {
            handler: CommandHandler::new(repository, publisher),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<R, B> {
        &self.handler
    }

    /// Creates a new item.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn create_item(&self, cmd: CreateItem) -> Result<CommandResult, DomainError> {
        self.handler
            .execute(&cmd, |item| {
                item.create(
                    cmd.item_id,
                    cmd.sku.as_str(),
                    cmd.name.as_str(),
                    cmd.description.as_str(),
                    cmd.quantity,
                )
            })
            .await
    }

    /// Changes an item's name and/or description.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn update_item(&self, cmd: UpdateItem) -> Result<CommandResult, DomainError> {
        let (name, description) = (cmd.name.clone(), cmd.description.clone());

        self.handler
            .execute(&cmd, |item| item.update_details(name, description))
            .await
    }

    /// Deletes an item.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn delete_item(&self, cmd: DeleteItem) -> Result<CommandResult, DomainError> {
        self.handler.execute(&cmd, |item| item.delete()).await
    }

    /// Adjusts an item's on-hand quantity.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn adjust_stock(&self, cmd: AdjustStock) -> Result<CommandResult, DomainError> {
        self.handler
            .execute(&cmd, |item| item.adjust_stock(cmd.delta))
            .await
    }

    /// Reserves units of an item.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn reserve_stock(&self, cmd: ReserveStock) -> Result<CommandResult, DomainError> {
        self.handler
            .execute(&cmd, |item| item.reserve_stock(cmd.quantity))
            .await
    }

    /// Releases reserved units of an item.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn release_stock(&self, cmd: ReleaseStock) -> Result<CommandResult, DomainError> {
        self.handler
            .execute(&cmd, |item| item.release_stock(cmd.quantity))
            .await
    }

    /// Ships reserved units of an item.
    #[tracing::instrument(skip(self), fields(item_id = %cmd.item_id))]
    pub async fn fulfill_reservation(
        &self,
        cmd: FulfillReservation,
    ) -> Result<CommandResult, DomainError> {
        self.handler
            .execute(&cmd, |item| item.fulfill_reservation(cmd.quantity))
            .await
    }

    /// Publishes envelopes the bus refused earlier, oldest first.
    ///
    /// Every command does this before publishing its own envelope; call it
    /// directly to recover without waiting for the next command.
    pub async fn publish_pending(&self) -> Result<usize, DomainError> {
        self.handler.publish_pending().await
    }

    /// Gets the command side's copy of an item.
    pub async fn get_item(&self, item_id: AggregateId) -> Result<Option<InventoryItem>, DomainError> {
        self.handler.load(item_id).await
    }
}
