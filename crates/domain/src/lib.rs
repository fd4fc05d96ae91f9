//! Domain layer for the inventory sync system.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for state-based aggregates
//! - The InventoryItem aggregate with its stock invariants
//! - InventoryEvent and its mapping to and from envelopes
//! - Command trait and CommandHandler for the command side
//! - InventoryService over a command-side ItemRepository

pub mod aggregate;
pub mod command;
pub mod error;
pub mod item;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult, PublishStatus};
pub use error::DomainError;
pub use item::{
    AdjustStock, CreateItem, DeleteItem, FulfillReservation, InMemoryItemRepository,
    InventoryError, InventoryEvent, InventoryItem, InventoryService, ItemCreatedData,
    ItemDeletedData, ItemRepository, ItemState, ItemUpdatedData, ReleaseStock, ReserveStock,
    ReservationFulfilledData, SeededItemRepository, StockAdjustedData, StockReleasedData,
    StockReservedData, UpdateItem, confirmation_envelope,
};
