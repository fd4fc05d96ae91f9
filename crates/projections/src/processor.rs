//! Projection processor for feeding confirmed envelopes to projections.

use std::sync::Arc;

use futures_util::StreamExt;
use messaging::{EventBus, EventEnvelope, PartitionStream, Topic};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Result;
use crate::projection::Projection;

/// Delivers confirmed envelopes to registered projections.
///
/// The processor supports:
/// - Live delivery: one consumer per partition of the confirmed topic
/// - Single envelope delivery: hands one envelope to every projection
/// - Rebuild: resets all projections and replays the retained topic
///
/// A failing projection is logged and does not stop delivery.
#[derive(Default)]
pub struct ProjectionProcessor {
    projections: Vec<Box<dyn Projection>>,
}

impl ProjectionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Delivers a single envelope to all registered projections.
    ///
    /// Every projection sees the envelope; the first error is returned.
    #[tracing::instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    pub async fn process_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut first_error = None;

        for projection in &self.projections {
            match projection.handle(envelope).await {
                Ok(()) => metrics::counter!("projections_events_processed").increment(1),
                Err(e) => {
                    tracing::error!(
                        projection = projection.name(),
                        event_id = %envelope.event_id,
                        aggregate_id = %envelope.aggregate_id,
                        error = %e,
                        "projection failed to handle envelope"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Resets all projections and replays the retained confirmed topic.
    ///
    /// Returns the number of envelopes delivered.
    #[tracing::instrument(skip(self, bus))]
    pub async fn rebuild_all<B: EventBus + ?Sized>(&self, bus: &B) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }

        let mut delivered = 0;
        for message in bus.read_all(Topic::Confirmed).await? {
            match EventEnvelope::from_bytes(&message.payload) {
                Ok(envelope) => {
                    // Failures are logged by process_event
                    let _ = self.process_event(&envelope).await;
                    delivered += 1;
                }
                Err(e) => tracing::warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "skipping undecodable confirmation"
                ),
            }
        }

        tracing::info!(envelopes = delivered, "rebuild complete");
        Ok(delivered)
    }

    /// Subscribes to the confirmed topic and delivers in the background.
    pub async fn start<B: EventBus + ?Sized>(self, bus: &B) -> Result<ProjectionWorker> {
        let streams = bus.subscribe(Topic::Confirmed).await?;
        let processor = Arc::new(self);
        let (shutdown, signal) = watch::channel(false);

        let consumers: Vec<_> = streams
            .into_iter()
            .map(|stream| tokio::spawn(consume(stream, Arc::clone(&processor), signal.clone())))
            .collect();

        tracing::info!(
            consumers = consumers.len(),
            projections = processor.projection_count(),
            "projection processor started"
        );

        Ok(ProjectionWorker {
            shutdown,
            consumers,
        })
    }
}

/// Handle to a running [`ProjectionProcessor`].
pub struct ProjectionWorker {
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
}

impl ProjectionWorker {
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Stops the consumers after their current envelope.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                tracing::error!(error = %e, "projection consumer failed");
            }
        }
        tracing::info!("projection processor stopped");
    }
}

async fn consume(
    stream: PartitionStream,
    processor: Arc<ProjectionProcessor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let PartitionStream {
        partition,
        mut messages,
    } = stream;

    while !*shutdown.borrow() {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = messages.next() => next,
        };

        match next {
            Some(Ok(message)) => match EventEnvelope::from_bytes(&message.payload) {
                Ok(envelope) => {
                    let _ = processor.process_event(&envelope).await;
                }
                Err(e) => tracing::warn!(
                    partition,
                    offset = message.offset,
                    error = %e,
                    "skipping undecodable confirmation"
                ),
            },
            Some(Err(e)) => tracing::warn!(partition, error = %e, "failed to read confirmation"),
            None => break,
        }
    }

    tracing::debug!(partition, "projection consumer stopped");
}
