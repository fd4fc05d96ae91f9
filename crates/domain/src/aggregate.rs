//! Aggregate and event traits shared by the command side and the writer.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use messaging::EventType;

/// A change to an aggregate, published as one envelope.
pub trait DomainEvent: std::fmt::Debug + Send + Sync + Clone {
    fn event_type(&self) -> EventType;
}

/// Trait for state-based aggregates whose changes travel as events.
///
/// The same event is applied twice in the life of a change: once on the
/// command side's local copy and once by the single writer against the
/// authoritative row. `apply` therefore validates the event against the
/// current state and must leave the state untouched when it fails.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    /// Invariant violations.
    type Error: std::error::Error + Send + Sync;

    /// Name used in logs.
    fn aggregate_type() -> &'static str;

    /// None until the create event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// 0 before creation, then one more per committed event.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Validates an event against the current state and applies it.
    ///
    /// `at` is the time the change happened. On error the aggregate is
    /// unchanged.
    fn apply(&mut self, event: &Self::Event, at: DateTime<Utc>) -> Result<(), Self::Error>;

    /// Applies an event and advances the version by one.
    ///
    /// Returns the new version.
    fn commit(&mut self, event: &Self::Event, at: DateTime<Utc>) -> Result<Version, Self::Error> {
        self.apply(event, at)?;
        let version = self.version().next();
        self.set_version(version);
        Ok(version)
    }
}
