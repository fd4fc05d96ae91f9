//! Publishing envelopes onto the bus with aggregate-keyed routing.

use crate::{
    EventEnvelope, Result, Topic,
    bus::{Delivery, EventBus},
};

/// Hands envelopes to the bus.
///
/// The topic is derived from the envelope's type and the partition key is
/// always the aggregate id, so every envelope of one item is delivered in
/// publication order. The publisher holds no state of its own and can be
/// cloned freely across command handlers.
#[derive(Clone)]
pub struct EventPublisher<B: EventBus> {
    bus: B,
}

impl<B: EventBus> EventPublisher<B> {
    /// Creates a publisher over the given bus.
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Returns a reference to the underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publishes an envelope to the topic of its event type.
    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<Delivery> {
        self.publish_to(envelope.topic(), envelope).await
    }

    /// Publishes an envelope to an explicit topic, keyed by aggregate id.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            aggregate_id = %envelope.aggregate_id,
        )
    )]
    pub async fn publish_to(&self, topic: Topic, envelope: &EventEnvelope) -> Result<Delivery> {
        let payload = envelope.to_bytes()?;

        match self
            .bus
            .publish(topic, &envelope.partition_key(), payload)
            .await
        {
            Ok(delivery) => {
                metrics::counter!("events_published_total", "topic" => topic.name()).increment(1);
                tracing::debug!(
                    %topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "envelope published"
                );
                Ok(delivery)
            }
            Err(e) => {
                metrics::counter!("publish_failures_total", "topic" => topic.name()).increment(1);
                tracing::warn!(%topic, error = %e, "envelope publish failed");
                Err(e)
            }
        }
    }
}
