//! Dead letters: envelopes the single writer could not apply.
//!
//! A dead letter keeps the original message bytes together with the reason
//! and the last error, so it can be inspected and replayed once the cause
//! is fixed. Dead letters are published to [`Topic::DeadLetter`] under the
//! original partition key.

use chrono::{DateTime, Utc};
use common::{AggregateId, EventId};
use messaging::{Delivery, EventBus, EventEnvelope, EventType, Topic};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessorError, Result};

/// Why an envelope was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The bytes are not a valid command-time envelope.
    ParseFailure,

    /// Applying the change would break a stock or lifecycle invariant.
    InvariantViolation,

    /// The envelope kept conflicting after every allowed retry.
    RetriesExhausted,

    /// The item the envelope targets does not exist.
    NotFound,

    /// The item or its SKU already exists.
    AlreadyExists,

    /// The store failed for a reason unrelated to the envelope.
    StoreFailure,
}

impl DeadLetterReason {
    /// Returns the reason as used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::ParseFailure => "parse_failure",
            DeadLetterReason::InvariantViolation => "invariant_violation",
            DeadLetterReason::RetriesExhausted => "retries_exhausted",
            DeadLetterReason::NotFound => "not_found",
            DeadLetterReason::AlreadyExists => "already_exists",
            DeadLetterReason::StoreFailure => "store_failure",
        }
    }

    /// Classifies the error that ended processing of an envelope.
    pub fn from_error(error: &ProcessorError) -> Self {
        match error {
            ProcessorError::Parse(_) => DeadLetterReason::ParseFailure,
            ProcessorError::Invariant(_) => DeadLetterReason::InvariantViolation,
            ProcessorError::Conflict { .. } => DeadLetterReason::RetriesExhausted,
            ProcessorError::NotFound(_) => DeadLetterReason::NotFound,
            ProcessorError::AlreadyExists(_) => DeadLetterReason::AlreadyExists,
            ProcessorError::Duplicate(_)
            | ProcessorError::Store(_)
            | ProcessorError::Messaging(_)
            | ProcessorError::WriterClosed => DeadLetterReason::StoreFailure,
        }
    }
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message the single writer gave up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Envelope id, when the message parsed far enough to have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<AggregateId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,

    /// Topic the message was consumed from.
    pub source_topic: Topic,

    /// Partition key of the original message.
    pub key: String,

    pub reason: DeadLetterReason,

    /// The last error, rendered for operators.
    pub error: String,

    /// Number of apply attempts made.
    pub attempts: u32,

    pub failed_at: DateTime<Utc>,

    /// The original message bytes, unchanged.
    pub payload: Vec<u8>,
}

impl DeadLetter {
    /// Creates a dead letter for a message that failed on its first attempt.
    pub fn new(
        source_topic: Topic,
        key: impl Into<String>,
        payload: Vec<u8>,
        reason: DeadLetterReason,
        error: impl ToString,
    ) -> Self {
        Self {
            event_id: None,
            aggregate_id: None,
            event_type: None,
            source_topic,
            key: key.into(),
            reason,
            error: error.to_string(),
            attempts: 1,
            failed_at: Utc::now(),
            payload,
        }
    }

    /// Records the identity of the parsed envelope.
    pub fn with_envelope(mut self, envelope: &EventEnvelope) -> Self {
        self.event_id = Some(envelope.event_id);
        self.aggregate_id = Some(envelope.aggregate_id);
        self.event_type = Some(envelope.event_type);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Publishes a dead letter to the dead-letter topic.
pub async fn publish_dead_letter<B>(bus: &B, letter: &DeadLetter) -> Result<Delivery>
where
    B: EventBus + ?Sized,
{
    let bytes = letter
        .to_bytes()
        .map_err(messaging::MessagingError::Serialization)?;
    let delivery = bus.publish(Topic::DeadLetter, &letter.key, bytes).await?;

    metrics::counter!("dead_letters_total", "reason" => letter.reason.as_str()).increment(1);

    Ok(delivery)
}

/// Selects dead letters for inspection or replay. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayFilter {
    pub reason: Option<DeadLetterReason>,
    pub aggregate_id: Option<AggregateId>,
}

impl ReplayFilter {
    /// Matches every dead letter.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: DeadLetterReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_aggregate(mut self, aggregate_id: AggregateId) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn matches(&self, letter: &DeadLetter) -> bool {
        self.reason.is_none_or(|r| r == letter.reason)
            && self
                .aggregate_id
                .is_none_or(|id| letter.aggregate_id == Some(id))
    }
}

/// Result of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Dead letters republished to their source topic.
    pub replayed: usize,

    /// Entries on the dead-letter topic that could not be decoded.
    pub skipped: usize,
}

/// Reads the dead-letter topic and republishes selected entries.
///
/// Replayed messages go back to their source topic under their original
/// key, byte for byte. The dead-letter topic itself is append-only, so a
/// replayed entry stays listed; replaying it again is harmless because the
/// single writer skips envelope ids it has already applied.
pub struct DeadLetterReplayer<B: EventBus> {
    bus: B,
}

impl<B: EventBus> DeadLetterReplayer<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Lists dead letters matching the filter, in partition order.
    pub async fn list(&self, filter: &ReplayFilter) -> Result<Vec<DeadLetter>> {
        Ok(self.scan(filter).await?.0)
    }

    /// Republishes every dead letter matching the filter.
    #[tracing::instrument(skip(self))]
    pub async fn replay(&self, filter: &ReplayFilter) -> Result<ReplayReport> {
        let (letters, skipped) = self.scan(filter).await?;
        let mut report = ReplayReport {
            replayed: 0,
            skipped,
        };

        for letter in letters {
            self.bus
                .publish(letter.source_topic, &letter.key, letter.payload.clone())
                .await?;
            report.replayed += 1;

            tracing::info!(
                event_id = ?letter.event_id,
                source_topic = %letter.source_topic,
                reason = %letter.reason,
                "dead letter replayed"
            );
        }

        Ok(report)
    }

    async fn scan(&self, filter: &ReplayFilter) -> Result<(Vec<DeadLetter>, usize)> {
        let mut letters = Vec::new();
        let mut skipped = 0;

        for message in self.bus.read_all(Topic::DeadLetter).await? {
            match DeadLetter::from_bytes(&message.payload) {
                Ok(letter) if filter.matches(&letter) => letters.push(letter),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "undecodable dead letter"
                    );
                }
            }
        }

        Ok((letters, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::InMemoryEventBus;

    fn letter(reason: DeadLetterReason, aggregate_id: AggregateId) -> DeadLetter {
        let mut letter = DeadLetter::new(
            Topic::StockMutation,
            aggregate_id.to_string(),
            b"{\"raw\":true}".to_vec(),
            reason,
            "boom",
        );
        letter.aggregate_id = Some(aggregate_id);
        letter
    }

    #[test]
    fn filter_matches_on_reason_and_aggregate() {
        let id = AggregateId::new();
        let entry = letter(DeadLetterReason::InvariantViolation, id);

        assert!(ReplayFilter::all().matches(&entry));
        assert!(ReplayFilter::all()
            .with_reason(DeadLetterReason::InvariantViolation)
            .matches(&entry));
        assert!(!ReplayFilter::all()
            .with_reason(DeadLetterReason::NotFound)
            .matches(&entry));
        assert!(!ReplayFilter::all()
            .with_aggregate(AggregateId::new())
            .matches(&entry));
    }

    #[test]
    fn reasons_classify_errors() {
        assert_eq!(
            DeadLetterReason::from_error(&ProcessorError::Parse("x".into())),
            DeadLetterReason::ParseFailure
        );
        assert_eq!(
            DeadLetterReason::from_error(&ProcessorError::NotFound(AggregateId::new())),
            DeadLetterReason::NotFound
        );
    }

    #[tokio::test]
    async fn replay_republishes_original_bytes() {
        let bus = InMemoryEventBus::new(2);
        let id = AggregateId::new();
        let kept = letter(DeadLetterReason::NotFound, id);
        let other = letter(DeadLetterReason::InvariantViolation, AggregateId::new());

        publish_dead_letter(&bus, &kept).await.unwrap();
        publish_dead_letter(&bus, &other).await.unwrap();
        bus.publish(Topic::DeadLetter, "junk", b"not json".to_vec())
            .await
            .unwrap();

        let replayer = DeadLetterReplayer::new(bus.clone());
        let report = replayer
            .replay(&ReplayFilter::all().with_reason(DeadLetterReason::NotFound))
            .await
            .unwrap();

        assert_eq!(report, ReplayReport { replayed: 1, skipped: 1 });

        let republished = bus.read_all(Topic::StockMutation).await.unwrap();
        assert_eq!(republished.len(), 1);
        assert_eq!(republished[0].key, id.to_string());
        assert_eq!(republished[0].payload, kept.payload);
    }
}
