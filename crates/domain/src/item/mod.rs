//! Inventory item aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod repository;
mod service;
mod state;

pub use aggregate::InventoryItem;
pub use commands::*;
pub use events::{
    InventoryEvent, ItemCreatedData, ItemDeletedData, ItemUpdatedData, ReservationFulfilledData,
    StockAdjustedData, StockReleasedData, StockReservedData, confirmation_envelope,
};
pub use repository::{InMemoryItemRepository, ItemRepository, SeededItemRepository};
pub use service::InventoryService;
pub use state::ItemState;

use thiserror::Error;

/// Invariant violations raised by the inventory item aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Not enough unreserved stock for the requested change.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Attempt to release or fulfill more than is reserved.
    #[error("Invalid release quantity: requested {requested}, reserved {reserved}")]
    InvalidReleaseQuantity { requested: i64, reserved: i64 },

    /// Quantity is out of range for the operation.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Item name must not be empty.
    #[error("Item name is required")]
    NameRequired,

    /// SKU must not be empty.
    #[error("SKU is required")]
    SkuRequired,

    /// An update carried no field to change.
    #[error("Update contains no changes")]
    NoChanges,

    /// The item has been deleted and accepts no further changes.
    #[error("Item is deleted")]
    ItemDeleted,

    /// The item has already been created.
    #[error("Item already created")]
    AlreadyCreated,

    /// The item has not been created yet.
    #[error("Item not created")]
    NotCreated,
}
