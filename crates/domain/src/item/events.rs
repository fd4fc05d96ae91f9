//! Inventory domain events and their envelope mapping.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use messaging::{EventEnvelope, EventType, META_AGGREGATE_VERSION, META_CORRELATION_ID};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::error::DomainError;

use super::ItemState;

/// Events that can occur on an inventory item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryEvent {
    /// Item was created.
    ItemCreated(ItemCreatedData),

    /// Item name or description changed.
    ItemUpdated(ItemUpdatedData),

    /// Item was deleted.
    ItemDeleted(ItemDeletedData),

    /// On-hand quantity was adjusted by a signed delta.
    StockAdjusted(StockAdjustedData),

    /// Units were reserved.
    StockReserved(StockReservedData),

    /// Reserved units were released back to available stock.
    StockReleased(StockReleasedData),

    /// Reserved units left the warehouse.
    ReservationFulfilled(ReservationFulfilledData),
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> EventType {
        match self {
            InventoryEvent::ItemCreated(_) => EventType::ItemCreated,
            InventoryEvent::ItemUpdated(_) => EventType::ItemUpdated,
            InventoryEvent::ItemDeleted(_) => EventType::ItemDeleted,
            InventoryEvent::StockAdjusted(_) => EventType::StockAdjusted,
            InventoryEvent::StockReserved(_) => EventType::StockReserved,
            InventoryEvent::StockReleased(_) => EventType::StockReleased,
            InventoryEvent::ReservationFulfilled(_) => EventType::ReservationFulfilled,
        }
    }
}

/// Data for ItemCreated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreatedData {
    /// The new item's id.
    pub id: AggregateId,

    pub sku: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Initial on-hand quantity.
    pub quantity: i64,
}

/// Data for ItemUpdated event. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdatedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Data for ItemDeleted event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeletedData {}

/// Data for StockAdjusted event.
///
/// Consumers apply `delta`; `new_quantity` is the total the command side
/// saw after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustedData {
    pub delta: i64,
    pub new_quantity: i64,
}

/// Data for StockReserved event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservedData {
    pub quantity: i64,
}

/// Data for StockReleased event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleasedData {
    pub quantity: i64,
}

/// Data for ReservationFulfilled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFulfilledData {
    pub quantity: i64,
}

impl InventoryEvent {
    /// Wraps the event in an envelope for the given item.
    ///
    /// `version` is the command-side version after the change and is
    /// recorded under the `aggregateVersion` metadata key.
    pub fn to_envelope(
        &self,
        aggregate_id: AggregateId,
        version: Version,
        occurred_at: DateTime<Utc>,
    ) -> Result<EventEnvelope, DomainError> {
        let builder = EventEnvelope::builder()
            .event_type(self.event_type())
            .aggregate_id(aggregate_id)
            .occurred_at(occurred_at)
            .metadata(META_AGGREGATE_VERSION, serde_json::json!(version));

        let builder = match self {
            InventoryEvent::ItemCreated(data) => builder.payload(data)?,
            InventoryEvent::ItemUpdated(data) => builder.payload(data)?,
            InventoryEvent::ItemDeleted(data) => builder.payload(data)?,
            InventoryEvent::StockAdjusted(data) => builder.payload(data)?,
            InventoryEvent::StockReserved(data) => builder.payload(data)?,
            InventoryEvent::StockReleased(data) => builder.payload(data)?,
            InventoryEvent::ReservationFulfilled(data) => builder.payload(data)?,
        };

        Ok(builder.build()?)
    }

    /// Decodes the event carried by a command-time envelope.
    ///
    /// Confirmation envelopes are rejected with `UnexpectedEventType`.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, DomainError> {
        let event = match envelope.event_type {
            EventType::ItemCreated => InventoryEvent::ItemCreated(envelope.payload_as()?),
            EventType::ItemUpdated => InventoryEvent::ItemUpdated(envelope.payload_as()?),
            EventType::ItemDeleted => InventoryEvent::ItemDeleted(envelope.payload_as()?),
            EventType::StockAdjusted => InventoryEvent::StockAdjusted(envelope.payload_as()?),
            EventType::StockReserved => InventoryEvent::StockReserved(envelope.payload_as()?),
            EventType::StockReleased => InventoryEvent::StockReleased(envelope.payload_as()?),
            EventType::ReservationFulfilled => {
                InventoryEvent::ReservationFulfilled(envelope.payload_as()?)
            }
            other => return Err(DomainError::UnexpectedEventType(other)),
        };

        if let InventoryEvent::ItemCreated(data) = &event
            && data.id != envelope.aggregate_id
        {
            return Err(DomainError::AggregateMismatch {
                envelope: envelope.aggregate_id,
                payload: data.id,
            });
        }

        Ok(event)
    }
}

/// Builds the `*Confirmed` envelope for a change the single writer applied.
///
/// The payload is the full post-change state. The source envelope's id is
/// recorded as the causation id and its correlation id is carried over.
pub fn confirmation_envelope(
    source: &EventEnvelope,
    state: &ItemState,
) -> Result<EventEnvelope, DomainError> {
    let mut builder = EventEnvelope::builder()
        .event_type(source.event_type.confirmed())
        .aggregate_id(source.aggregate_id)
        .payload(state)?
        .causation_id(source.event_id)
        .metadata(META_AGGREGATE_VERSION, serde_json::json!(state.version));

    if let Some(correlation) = source.metadata.get(META_CORRELATION_ID) {
        builder = builder.metadata(META_CORRELATION_ID, correlation.clone());
    }

    Ok(builder.build()?)
}
