//! Inventory commands.

use common::AggregateId;

use crate::command::Command;

/// Command to create a new item.
#[derive(Debug, Clone)]
pub struct CreateItem {
    pub item_id: AggregateId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub quantity: i64,
}

impl CreateItem {
    /// Creates a new CreateItem command with a generated item ID.
    pub fn new(sku: impl Into<String>, name: impl Into<String>, quantity: i64) -> Self {
        Self {
            item_id: AggregateId::new(),
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            quantity,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Uses a caller-chosen item ID.
    pub fn with_id(mut self, item_id: AggregateId) -> Self {
        self.item_id = item_id;
        self
    }
}

impl Command for CreateItem {
    fn command_name(&self) -> &'static str {
        "create_item"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to change an item's name and/or description.
#[derive(Debug, Clone)]
pub struct UpdateItem {
    pub item_id: AggregateId,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateItem {
    /// Creates an UpdateItem command that changes nothing yet.
    pub fn new(item_id: AggregateId) -> Self {
        Self {
            item_id,
            name: None,
            description: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Command for UpdateItem {
    fn command_name(&self) -> &'static str {
        "update_item"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to delete an item.
#[derive(Debug, Clone)]
pub struct DeleteItem {
    pub item_id: AggregateId,
}

impl DeleteItem {
    pub fn new(item_id: AggregateId) -> Self {
        Self { item_id }
    }
}

impl Command for DeleteItem {
    fn command_name(&self) -> &'static str {
        "delete_item"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to adjust on-hand quantity by a signed delta.
#[derive(Debug, Clone)]
pub struct AdjustStock {
    pub item_id: AggregateId,
    pub delta: i64,
}

impl AdjustStock {
    pub fn new(item_id: AggregateId, delta: i64) -> Self {
        Self { item_id, delta }
    }
}

impl Command for AdjustStock {
    fn command_name(&self) -> &'static str {
        "adjust_stock"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to reserve units.
#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub item_id: AggregateId,
    pub quantity: i64,
}

impl ReserveStock {
    pub fn new(item_id: AggregateId, quantity: i64) -> Self {
        Self { item_id, quantity }
    }
}

impl Command for ReserveStock {
    fn command_name(&self) -> &'static str {
        "reserve_stock"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to release reserved units.
#[derive(Debug, Clone)]
pub struct ReleaseStock {
    pub item_id: AggregateId,
    pub quantity: i64,
}

impl ReleaseStock {
    pub fn new(item_id: AggregateId, quantity: i64) -> Self {
        Self { item_id, quantity }
    }
}

impl Command for ReleaseStock {
    fn command_name(&self) -> &'static str {
        "release_stock"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}

/// Command to ship reserved units.
#[derive(Debug, Clone)]
pub struct FulfillReservation {
    pub item_id: AggregateId,
    pub quantity: i64,
}

impl FulfillReservation {
    pub fn new(item_id: AggregateId, quantity: i64) -> Self {
        Self { item_id, quantity }
    }
}

impl Command for FulfillReservation {
    fn command_name(&self) -> &'static str {
        "fulfill_reservation"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.item_id
    }
}
