//! The projection seam between the confirmed topic and read-side state.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use messaging::EventEnvelope;

use crate::Result;

/// How far a projection has got through the confirmed topic.
///
/// Partitions are consumed concurrently, so `last_event` is the most
/// recently handled envelope, not a resume point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub handled: u64,
    pub last_event: Option<EventId>,
    pub last_occurred_at: Option<DateTime<Utc>>,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Records one more handled envelope.
    pub fn advance(&self, envelope: &EventEnvelope) -> Self {
        Self {
            handled: self.handled + 1,
            last_event: Some(envelope.event_id),
            last_occurred_at: Some(envelope.occurred_at),
        }
    }
}

impl fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_event {
            Some(event_id) => write!(f, "{} handled, last {event_id}", self.handled),
            None => write!(f, "{} handled", self.handled),
        }
    }
}

/// Turns confirmed envelopes into read-side state.
///
/// Delivery is at-least-once and handlers for different partitions run
/// concurrently, so `handle` must be idempotent.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops everything the projection has built.
    async fn reset(&self) -> Result<()>;
}
