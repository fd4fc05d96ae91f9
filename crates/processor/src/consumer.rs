//! The event processor: partition consumers feeding the single writer.

use std::sync::Arc;

use futures_util::StreamExt;
use item_store::ItemStore;
use messaging::{EventBus, EventPublisher, PartitionStream, Topic};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::retry::RetryPolicy;
use crate::writer::{Applier, SingleWriter};

/// Consumes the command topics and applies every envelope through the
/// single writer.
///
/// There is one consumer task per topic partition. A consumer waits for
/// the outcome of each message before pulling the next one, which keeps
/// the envelopes of one item in publication order.
pub struct EventProcessor {
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
    writer: SingleWriter,
}

impl EventProcessor {
    /// Subscribes to the command topics and starts consuming.
    pub async fn start<S, B>(store: S, bus: B, policy: RetryPolicy) -> Result<Self>
    where
        S: ItemStore + 'static,
        B: EventBus + Clone + 'static,
    {
        let mut streams = Vec::new();
        for topic in Topic::COMMANDS {
            for stream in bus.subscribe(topic).await? {
                streams.push((topic, stream));
            }
        }

        let writer = SingleWriter::spawn(Applier::new(store, EventPublisher::new(bus.clone())));
        let pipeline = Arc::new(Pipeline::new(writer.handle(), bus, policy));
        let (shutdown, signal) = watch::channel(false);

        let consumers: Vec<_> = streams
            .into_iter()
            .map(|(topic, stream)| {
                tokio::spawn(consume(topic, stream, Arc::clone(&pipeline), signal.clone()))
            })
            .collect();

        tracing::info!(consumers = consumers.len(), "event processor started");

        Ok(Self {
            shutdown,
            consumers,
            writer,
        })
    }

    /// Returns the number of partition consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Stops pulling new messages, lets in-flight applies finish, then
    /// stops the writer.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                tracing::error!(error = %e, "partition consumer failed");
            }
        }

        self.writer.shutdown().await;
        tracing::info!("event processor stopped");
    }
}

async fn consume<B: EventBus>(
    topic: Topic,
    stream: PartitionStream,
    pipeline: Arc<Pipeline<B>>,
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
            Some(Ok(message)) => {
                match pipeline.process(topic, &message.key, &message.payload).await {
                    Ok(outcome) => tracing::trace!(
                        %topic,
                        partition,
                        offset = message.offset,
                        outcome = outcome.label(),
                        "message processed"
                    ),
                    Err(e) => {
                        tracing::error!(%topic, partition, error = %e, "stopping consumer");
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(%topic, partition, error = %e, "failed to read message");
            }
            None => break,
        }
    }

    tracing::debug!(%topic, partition, "partition consumer stopped");
}
