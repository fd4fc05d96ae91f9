use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, EventId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{MessagingError, Result, Topic};

/// Schema version written by this producer.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata key holding the command-side aggregate version after the mutation.
pub const META_AGGREGATE_VERSION: &str = "aggregateVersion";

/// Metadata key holding the id of the envelope that caused this one.
pub const META_CAUSATION_ID: &str = "causationId";

/// Metadata key holding a caller-supplied correlation id.
pub const META_CORRELATION_ID: &str = "correlationId";

/// Declared type of an envelope.
///
/// Command-time types are published by the command side; each has a
/// `*Confirmed` counterpart emitted by the single writer once the change
/// is durable in the authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    StockAdjusted,
    StockReserved,
    StockReleased,
    ReservationFulfilled,
    ItemCreatedConfirmed,
    ItemUpdatedConfirmed,
    ItemDeletedConfirmed,
    StockAdjustedConfirmed,
    StockReservedConfirmed,
    StockReleasedConfirmed,
    ReservationFulfilledConfirmed,
}

impl EventType {
    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ItemCreated => "ItemCreated",
            EventType::ItemUpdated => "ItemUpdated",
            EventType::ItemDeleted => "ItemDeleted",
            EventType::StockAdjusted => "StockAdjusted",
            EventType::StockReserved => "StockReserved",
            EventType::StockReleased => "StockReleased",
            EventType::ReservationFulfilled => "ReservationFulfilled",
            EventType::ItemCreatedConfirmed => "ItemCreatedConfirmed",
            EventType::ItemUpdatedConfirmed => "ItemUpdatedConfirmed",
            EventType::ItemDeletedConfirmed => "ItemDeletedConfirmed",
            EventType::StockAdjustedConfirmed => "StockAdjustedConfirmed",
            EventType::StockReservedConfirmed => "StockReservedConfirmed",
            EventType::StockReleasedConfirmed => "StockReleasedConfirmed",
            EventType::ReservationFulfilledConfirmed => "ReservationFulfilledConfirmed",
        }
    }

    /// Returns true for types emitted by the single writer.
    pub fn is_confirmation(&self) -> bool {
        matches!(
            self,
            EventType::ItemCreatedConfirmed
                | EventType::ItemUpdatedConfirmed
                | EventType::ItemDeletedConfirmed
                | EventType::StockAdjustedConfirmed
                | EventType::StockReservedConfirmed
                | EventType::StockReleasedConfirmed
                | EventType::ReservationFulfilledConfirmed
        )
    }

    /// Returns the confirmation counterpart. Confirmation types map to themselves.
    pub fn confirmed(&self) -> EventType {
        match self {
            EventType::ItemCreated => EventType::ItemCreatedConfirmed,
            EventType::ItemUpdated => EventType::ItemUpdatedConfirmed,
            EventType::ItemDeleted => EventType::ItemDeletedConfirmed,
            EventType::StockAdjusted => EventType::StockAdjustedConfirmed,
            EventType::StockReserved => EventType::StockReservedConfirmed,
            EventType::StockReleased => EventType::StockReleasedConfirmed,
            EventType::ReservationFulfilled => EventType::ReservationFulfilledConfirmed,
            confirmed => *confirmed,
        }
    }

    /// Returns the topic envelopes of this type are published to.
    pub fn topic(&self) -> Topic {
        match self {
            EventType::ItemCreated | EventType::ItemUpdated | EventType::ItemDeleted => {
                Topic::ItemLifecycle
            }
            EventType::StockAdjusted
            | EventType::StockReserved
            | EventType::StockReleased
            | EventType::ReservationFulfilled => Topic::StockMutation,
            _ => Topic::Confirmed,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable transport wrapper around a domain event.
///
/// Serialized as a camelCase JSON object:
/// `{eventType, eventId, aggregateId, occurredAt, schemaVersion, payload}`
/// plus `metadata` when it is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// The declared type of the event.
    pub event_type: EventType,

    /// Unique identifier for this envelope.
    pub event_id: EventId,

    /// The item this event belongs to; also the partition key.
    pub aggregate_id: AggregateId,

    /// When the change happened.
    pub occurred_at: DateTime<Utc>,

    /// Schema version of the payload.
    pub schema_version: u32,

    /// Event-specific fields.
    pub payload: serde_json::Value,

    /// Additional metadata (causation, correlation, aggregate version).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Returns the topic this envelope is routed to.
    pub fn topic(&self) -> Topic {
        self.event_type.topic()
    }

    /// Returns the partition key: the aggregate id.
    pub fn partition_key(&self) -> String {
        self.aggregate_id.to_string()
    }

    /// Deserializes the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Returns the id of the envelope that caused this one, if recorded.
    pub fn causation_id(&self) -> Option<EventId> {
        self.metadata
            .get(META_CAUSATION_ID)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns the command-side aggregate version recorded at publish time.
    pub fn aggregate_version(&self) -> Option<i64> {
        self.metadata
            .get(META_AGGREGATE_VERSION)
            .and_then(serde_json::Value::as_i64)
    }

    /// Encodes the envelope into its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope from its JSON wire form.
    ///
    /// Envelopes written with a newer schema version are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(bytes)?;
        if envelope.schema_version > SCHEMA_VERSION {
            return Err(MessagingError::UnsupportedSchemaVersion {
                found: envelope.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(envelope)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<EventType>,
    aggregate_id: Option<AggregateId>,
    occurred_at: Option<DateTime<Utc>>,
    schema_version: Option<u32>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the occurrence time. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Overrides the schema version. Defaults to [`SCHEMA_VERSION`].
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records the envelope that caused this one.
    pub fn causation_id(self, id: EventId) -> Self {
        self.metadata(META_CAUSATION_ID, serde_json::json!(id))
    }

    /// Builds the envelope, failing if a required field is missing.
    pub fn build(self) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_type: self
                .event_type
                .ok_or(MessagingError::MissingField("event_type"))?,
            event_id: self.event_id.unwrap_or_default(),
            aggregate_id: self
                .aggregate_id
                .ok_or(MessagingError::MissingField("aggregate_id"))?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            schema_version: self.schema_version.unwrap_or(SCHEMA_VERSION),
            payload: self.payload.ok_or(MessagingError::MissingField("payload"))?,
            metadata: self.metadata,
        })
    }
}
