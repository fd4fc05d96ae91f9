//! Inventory item aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use item_store::ItemRecord;

use crate::aggregate::Aggregate;

use super::{
    InventoryError, InventoryEvent, ItemCreatedData, ItemDeletedData, ItemState, ItemUpdatedData,
    ReservationFulfilledData, StockAdjustedData, StockReleasedData, StockReservedData,
};

/// Inventory item aggregate root.
///
/// Invariants after every change: `quantity >= 0`, `reserved >= 0` and
/// `reserved <= quantity`. `available` is always derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryItem {
    id: Option<AggregateId>,
    version: Version,
    sku: String,
    name: String,
    description: String,
    quantity: i64,
    reserved: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Aggregate for InventoryItem {
    type Event = InventoryEvent;
    type Error = InventoryError;

    fn aggregate_type() -> &'static str {
        "InventoryItem"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: &InventoryEvent, at: DateTime<Utc>) -> Result<(), InventoryError> {
        self.check(event)?;

        match event {
            InventoryEvent::ItemCreated(data) => {
                self.id = Some(data.id);
                self.sku = data.sku.clone();
                self.name = data.name.clone();
                self.description = data.description.clone();
                self.quantity = data.quantity;
                self.reserved = 0;
                self.created_at = at;
            }
            InventoryEvent::ItemUpdated(data) => {
                if let Some(name) = &data.name {
                    self.name = name.clone();
                }
                if let Some(description) = &data.description {
                    self.description = description.clone();
                }
            }
            InventoryEvent::ItemDeleted(_) => {
                self.deleted_at = Some(at);
            }
            InventoryEvent::StockAdjusted(data) => {
                self.quantity += data.delta;
            }
            InventoryEvent::StockReserved(data) => {
                self.reserved += data.quantity;
            }
            InventoryEvent::StockReleased(data) => {
                self.reserved -= data.quantity;
            }
            InventoryEvent::ReservationFulfilled(data) => {
                self.reserved -= data.quantity;
                self.quantity -= data.quantity;
            }
        }

        self.updated_at = at;
        Ok(())
    }
}

// Query methods
impl InventoryItem {
    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Units on hand.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Units held by reservations.
    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns true once the item has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Converts the item into a store row. Fails for an item never created.
    pub fn to_record(&self) -> Result<ItemRecord, InventoryError> {
        let id = self.id.ok_or(InventoryError::NotCreated)?;
        Ok(ItemRecord {
            id,
            sku: self.sku.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            reserved: self.reserved,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }

    /// Returns the resolved state. Fails for an item never created.
    pub fn to_state(&self) -> Result<ItemState, InventoryError> {
        Ok(ItemState::from(self.to_record()?))
    }
}

impl From<ItemRecord> for InventoryItem {
    fn from(record: ItemRecord) -> Self {
        Self {
            id: Some(record.id),
            version: record.version,
            sku: record.sku,
            name: record.name,
            description: record.description,
            quantity: record.quantity,
            reserved: record.reserved,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}

// Command methods (return the event to commit)
impl InventoryItem {
    /// Creates a new item.
    pub fn create(
        &self,
        id: AggregateId,
        sku: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        quantity: i64,
    ) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::ItemCreated(ItemCreatedData {
            id,
            sku: sku.into(),
            name: name.into(),
            description: description.into(),
            quantity,
        }))
    }

    /// Changes the name and/or description.
    pub fn update_details(
        &self,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::ItemUpdated(ItemUpdatedData { name, description }))
    }

    /// Deletes the item.
    pub fn delete(&self) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::ItemDeleted(ItemDeletedData {}))
    }

    /// Adjusts on-hand quantity by a signed delta.
    pub fn adjust_stock(&self, delta: i64) -> Result<InventoryEvent, InventoryError> {
        let new_quantity = self
            .quantity
            .checked_add(delta)
            .ok_or(InventoryError::InvalidQuantity { quantity: delta })?;

        self.decide(InventoryEvent::StockAdjusted(StockAdjustedData {
            delta,
            new_quantity,
        }))
    }

    /// Reserves units from available stock.
    pub fn reserve_stock(&self, quantity: i64) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::StockReserved(StockReservedData { quantity }))
    }

    /// Releases reserved units back to available stock.
    pub fn release_stock(&self, quantity: i64) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::StockReleased(StockReleasedData { quantity }))
    }

    /// Ships reserved units: both `reserved` and `quantity` drop.
    pub fn fulfill_reservation(&self, quantity: i64) -> Result<InventoryEvent, InventoryError> {
        self.decide(InventoryEvent::ReservationFulfilled(
            ReservationFulfilledData { quantity },
        ))
    }

    fn decide(&self, event: InventoryEvent) -> Result<InventoryEvent, InventoryError> {
        self.check(&event)?;
        Ok(event)
    }

    /// Validates an event against the current state without changing it.
    fn check(&self, event: &InventoryEvent) -> Result<(), InventoryError> {
        if let InventoryEvent::ItemCreated(data) = event {
            if self.id.is_some() {
                return Err(InventoryError::AlreadyCreated);
            }
            if data.sku.trim().is_empty() {
                return Err(InventoryError::SkuRequired);
            }
            if data.name.trim().is_empty() {
                return Err(InventoryError::NameRequired);
            }
            if data.quantity < 0 {
                return Err(InventoryError::InvalidQuantity {
                    quantity: data.quantity,
                });
            }
            return Ok(());
        }

        if self.id.is_none() {
            return Err(InventoryError::NotCreated);
        }
        if self.is_deleted() {
            return Err(InventoryError::ItemDeleted);
        }

        match event {
            InventoryEvent::ItemCreated(_) | InventoryEvent::ItemDeleted(_) => Ok(()),
            InventoryEvent::ItemUpdated(data) => {
                if data.name.is_none() && data.description.is_none() {
                    return Err(InventoryError::NoChanges);
                }
                if data.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(InventoryError::NameRequired);
                }
                Ok(())
            }
            InventoryEvent::StockAdjusted(data) => {
                if data.delta == 0 {
                    return Err(InventoryError::InvalidQuantity { quantity: 0 });
                }
                // A decrease may consume at most the unreserved stock, which
                // keeps both quantity >= 0 and reserved <= quantity
                if data.delta < 0 && data.delta.unsigned_abs() > self.available().unsigned_abs() {
                    return Err(InventoryError::InsufficientStock {
                        requested: data.delta.saturating_neg(),
                        available: self.available(),
                    });
                }
                if self.quantity.checked_add(data.delta).is_none() {
                    return Err(InventoryError::InvalidQuantity {
                        quantity: data.delta,
                    });
                }
                Ok(())
            }
            InventoryEvent::StockReserved(data) => {
                Self::check_positive(data.quantity)?;
                if data.quantity > self.available() {
                    return Err(InventoryError::InsufficientStock {
                        requested: data.quantity,
                        available: self.available(),
                    });
                }
                Ok(())
            }
            InventoryEvent::StockReleased(StockReleasedData { quantity })
            | InventoryEvent::ReservationFulfilled(ReservationFulfilledData { quantity }) => {
                Self::check_positive(*quantity)?;
                if *quantity > self.reserved {
                    return Err(InventoryError::InvalidReleaseQuantity {
                        requested: *quantity,
                        reserved: self.reserved,
                    });
                }
                Ok(())
            }
        }
    }

    fn check_positive(quantity: i64) -> Result<(), InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        Ok(())
    }
}
