//! Per-envelope processing: parse, apply with bounded retries, dead-letter.

use std::time::Instant;

use common::Version;
use domain::InventoryEvent;
use messaging::{EventBus, EventEnvelope, Topic};

use crate::dead_letter::{DeadLetter, DeadLetterReason, publish_dead_letter};
use crate::error::{ProcessorError, Result};
use crate::retry::RetryPolicy;
use crate::writer::{WriteOutcome, WriterHandle};

/// Where an envelope is in its processing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Received,
    Parsed,
    Applied,
    Conflict,
    Failed,
    DeadLettered,
}

/// Final result of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change is durable at `version`.
    Applied {
        version: Version,
        confirmation_published: bool,
    },

    /// The envelope had already been applied.
    Duplicate,

    /// The message was moved to the dead-letter topic.
    DeadLettered { reason: DeadLetterReason },
}

impl ApplyOutcome {
    /// Returns the outcome as used in metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied { .. } => "applied",
            ApplyOutcome::Duplicate => "duplicate",
            ApplyOutcome::DeadLettered { .. } => "dead_lettered",
        }
    }
}

/// Turns raw bus messages into write attempts.
///
/// Version conflicts are retried here, outside the writer, so a waiting
/// envelope never holds up envelopes from other partitions.
pub struct Pipeline<B: EventBus> {
    writer: WriterHandle,
    bus: B,
    policy: RetryPolicy,
}

impl<B: EventBus> Pipeline<B> {
    /// Creates a pipeline that dead-letters to `bus`.
    pub fn new(writer: WriterHandle, bus: B, policy: RetryPolicy) -> Self {
        Self {
            writer,
            bus,
            policy,
        }
    }

    /// Processes one message consumed from `topic`.
    ///
    /// Fails only when the writer has stopped; every other failure ends in
    /// a dead letter.
    #[tracing::instrument(skip(self, payload))]
    pub async fn process(&self, topic: Topic, key: &str, payload: &[u8]) -> Result<ApplyOutcome> {
        let started = Instant::now();
        let outcome = self.run(topic, key, payload).await?;

        metrics::counter!("processor_envelopes_total", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("processor_apply_seconds").record(started.elapsed().as_secs_f64());

        Ok(outcome)
    }

    async fn run(&self, topic: Topic, key: &str, payload: &[u8]) -> Result<ApplyOutcome> {
        tracing::trace!(stage = ?ProcessingStage::Received);

        let envelope = match EventEnvelope::from_bytes(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let letter = DeadLetter::new(
                    topic,
                    key,
                    payload.to_vec(),
                    DeadLetterReason::ParseFailure,
                    e,
                );
                return Ok(self.dead_letter(letter).await);
            }
        };

        let event = match InventoryEvent::from_envelope(&envelope) {
            Ok(event) => event,
            Err(e) => {
                let letter = DeadLetter::new(
                    topic,
                    key,
                    payload.to_vec(),
                    DeadLetterReason::ParseFailure,
                    e,
                )
                .with_envelope(&envelope);
                return Ok(self.dead_letter(letter).await);
            }
        };

        tracing::debug!(
            stage = ?ProcessingStage::Parsed,
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
        );

        let mut retries = 0;
        loop {
            match self.writer.apply(envelope.clone(), event.clone()).await {
                Ok(WriteOutcome::Applied {
                    version,
                    confirmation_published,
                }) => {
                    tracing::debug!(stage = ?ProcessingStage::Applied, %version);
                    return Ok(ApplyOutcome::Applied {
                        version,
                        confirmation_published,
                    });
                }
                Ok(WriteOutcome::Duplicate) => {
                    tracing::debug!(event_id = %envelope.event_id, "envelope already applied");
                    return Ok(ApplyOutcome::Duplicate);
                }
                Err(ProcessorError::WriterClosed) => return Err(ProcessorError::WriterClosed),
                Err(e) if e.is_retryable() && self.policy.should_retry(retries) => {
                    let delay = self.policy.delay_for_attempt(retries);
                    retries += 1;
                    metrics::counter!("processor_conflicts_total").increment(1);
                    tracing::warn!(
                        stage = ?ProcessingStage::Conflict,
                        error = %e,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "version conflict; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let letter = DeadLetter::new(
                        topic,
                        key,
                        payload.to_vec(),
                        DeadLetterReason::from_error(&e),
                        &e,
                    )
                    .with_envelope(&envelope)
                    .with_attempts(retries + 1);
                    return Ok(self.dead_letter(letter).await);
                }
            }
        }
    }

    async fn dead_letter(&self, letter: DeadLetter) -> ApplyOutcome {
        tracing::warn!(
            stage = ?ProcessingStage::Failed,
            reason = %letter.reason,
            attempts = letter.attempts,
            error = %letter.error,
            "envelope could not be applied"
        );

        match publish_dead_letter(&self.bus, &letter).await {
            Ok(_) => tracing::debug!(stage = ?ProcessingStage::DeadLettered),
            Err(e) => tracing::error!(
                event_id = ?letter.event_id,
                error = %e,
                "failed to publish dead letter"
            ),
        }

        ApplyOutcome::DeadLettered {
            reason: letter.reason,
        }
    }
}
