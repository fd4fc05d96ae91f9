//! The single writer: the only component that mutates the authoritative store.
//!
//! Consumers hand parsed envelopes to the writer through a bounded queue
//! and wait for the result of each attempt. The writer applies one
//! envelope at a time, so every store mutation is serialized no matter how
//! many partitions are consumed in parallel.

use chrono::{DateTime, Utc};
use common::{AggregateId, Version};
use domain::{Aggregate, InventoryEvent, InventoryItem, ItemState, confirmation_envelope};
use item_store::{ItemRecord, ItemStore};
use messaging::{EventBus, EventEnvelope, EventPublisher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{ProcessorError, Result};

/// Capacity of the writer's request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Result of one successful write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The change is durable at `version`.
    Applied {
        version: Version,
        confirmation_published: bool,
    },

    /// The envelope id was already recorded; nothing changed. The current
    /// row is confirmed again in case the first confirmation was lost.
    Duplicate,
}

/// Applies envelopes to the authoritative store and emits confirmations.
///
/// Each call is a single attempt: a version conflict is returned to the
/// caller rather than retried here.
pub struct Applier<S, B: EventBus> {
    store: S,
    publisher: EventPublisher<B>,
}

impl<S, B> Applier<S, B>
where
    S: ItemStore,
    B: EventBus,
{
    pub fn new(store: S, publisher: EventPublisher<B>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies `event` (decoded from `envelope`) against the current row.
    ///
    /// The change is re-validated against the authoritative state, then
    /// written with a version check together with the envelope id. On
    /// success a `*Confirmed` envelope carrying the full new state is
    /// published; a failed publish is reported, not raised.
    ///
    /// A redelivered envelope changes nothing but confirms the current row
    /// again, so replaying it recovers a lost confirmation.
    pub async fn apply(
        &self,
        envelope: &EventEnvelope,
        event: &InventoryEvent,
    ) -> Result<WriteOutcome> {
        if self.store.has_processed(envelope.event_id).await? {
            return self.reconfirm(envelope).await;
        }

        let record = match self.write(envelope, event).await {
            Err(ProcessorError::Duplicate(_)) => return self.reconfirm(envelope).await,
            result => result?,
        };

        let confirmation_published = self.confirm(envelope, &ItemState::from(&record)).await;

        Ok(WriteOutcome::Applied {
            version: record.version,
            confirmation_published,
        })
    }

    async fn write(&self, envelope: &EventEnvelope, event: &InventoryEvent) -> Result<ItemRecord> {
        let id = envelope.aggregate_id;
        let at = envelope.occurred_at;

        if let InventoryEvent::ItemCreated(_) = event {
            let record = derive(InventoryItem::default(), event, at)?;
            self.store.insert(&record, envelope.event_id).await?;
            return Ok(record);
        }

        // The version the command side built on, when the envelope says so
        let base = envelope
            .aggregate_version()
            .map(|v| Version::new(v.saturating_sub(1)));

        let Some(current) = self.store.get(id).await? else {
            return Err(missing_row(id, base));
        };

        // An earlier change of this item has not been applied yet
        if let Some(base) = base
            && current.version < base
        {
            return Err(ProcessorError::Conflict {
                aggregate_id: id,
                expected: base,
                actual: current.version,
            });
        }

        let expected = current.version;
        let record = derive(InventoryItem::from(current), event, at)?;
        self.store
            .update_if_version(&record, expected, envelope.event_id)
            .await?;

        Ok(record)
    }

    async fn reconfirm(&self, source: &EventEnvelope) -> Result<WriteOutcome> {
        // Consumers skip versions they already hold
        if let Some(current) = self.store.get(source.aggregate_id).await? {
            self.confirm(source, &ItemState::from(&current)).await;
        }
        Ok(WriteOutcome::Duplicate)
    }

    async fn confirm(&self, source: &EventEnvelope, state: &ItemState) -> bool {
        let result = match confirmation_envelope(source, state) {
            Ok(confirmation) => self
                .publisher
                .publish(&confirmation)
                .await
                .map_err(ProcessorError::from),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    aggregate_id = %source.aggregate_id,
                    event_id = %source.event_id,
                    error = %e,
                    "failed to publish confirmation; store change kept"
                );
                false
            }
        }
    }
}

fn derive(
    mut item: InventoryItem,
    event: &InventoryEvent,
    at: DateTime<Utc>,
) -> Result<ItemRecord> {
    item.commit(event, at)?;
    Ok(item.to_record()?)
}

/// A non-create envelope whose row is absent is early if it expects a
/// prior version, and targets an unknown item otherwise.
fn missing_row(id: AggregateId, base: Option<Version>) -> ProcessorError {
    match base {
        Some(base) if base > Version::initial() => ProcessorError::Conflict {
            aggregate_id: id,
            expected: base,
            actual: Version::initial(),
        },
        _ => ProcessorError::NotFound(id),
    }
}

struct WriteRequest {
    envelope: EventEnvelope,
    event: InventoryEvent,
    reply: oneshot::Sender<Result<WriteOutcome>>,
}

/// Cloneable handle for submitting envelopes to a running writer.
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriteRequest>,
}

impl WriterHandle {
    /// Submits one write attempt and waits for its result.
    pub async fn apply(
        &self,
        envelope: EventEnvelope,
        event: InventoryEvent,
    ) -> Result<WriteOutcome> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WriteRequest {
                envelope,
                event,
                reply,
            })
            .await
            .map_err(|_| ProcessorError::WriterClosed)?;

        response.await.map_err(|_| ProcessorError::WriterClosed)?
    }
}

/// The writer task and the sender feeding it.
pub struct SingleWriter {
    handle: WriterHandle,
    task: JoinHandle<()>,
}

impl SingleWriter {
    /// Spawns the writer task.
    pub fn spawn<S, B>(applier: Applier<S, B>) -> Self
    where
        S: ItemStore + 'static,
        B: EventBus + 'static,
    {
        Self::with_capacity(applier, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity<S, B>(applier: Applier<S, B>, capacity: usize) -> Self
    where
        S: ItemStore + 'static,
        B: EventBus + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<WriteRequest>(capacity.max(1));

        let task = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let result = applier.apply(&request.envelope, &request.event).await;
                // The submitter may have given up waiting
                let _ = request.reply.send(result);
            }
            tracing::debug!("single writer drained");
        });

        Self {
            handle: WriterHandle { sender },
            task,
        }
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Stops accepting work and waits for queued requests to finish.
    ///
    /// Outstanding [`WriterHandle`] clones keep the queue open, so drop
    /// them first.
    pub async fn shutdown(self) {
        drop(self.handle);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "single writer task failed");
        }
    }
}
