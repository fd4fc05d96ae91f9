use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream;
use tokio::sync::{Notify, RwLock};

use crate::{
    MessagingError, Result, Topic,
    bus::{BusMessage, Delivery, EventBus, MessageStream, PartitionStream, partition_for},
};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 8;

#[derive(Default)]
struct Partition {
    log: RwLock<Vec<BusMessage>>,
    notify: Notify,
}

/// In-process event bus with per-key partition ordering.
///
/// Every topic is split into a fixed number of append-only partitions.
/// Subscribers read a partition from offset zero and wait for new
/// messages once they have caught up, so late subscribers still see the
/// full retained history.
#[derive(Clone)]
pub struct InMemoryEventBus {
    topics: Arc<HashMap<Topic, Vec<Arc<Partition>>>>,
    partitions: u32,
    closed: Arc<AtomicBool>,
    failing_publishes: Arc<AtomicU32>,
}

impl InMemoryEventBus {
    /// Creates a bus with `partitions` partitions per topic (at least one).
    pub fn new(partitions: u32) -> Self {
        let partitions = partitions.max(1);
        let topics = Topic::ALL
            .into_iter()
            .map(|topic| {
                let parts = (0..partitions)
                    .map(|_| Arc::new(Partition::default()))
                    .collect();
                (topic, parts)
            })
            .collect();

        Self {
            topics: Arc::new(topics),
            partitions,
            closed: Arc::new(AtomicBool::new(false)),
            failing_publishes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Makes the next `count` publish calls fail, simulating a broker outage.
    pub fn fail_next_publishes(&self, count: u32) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Returns the number of messages retained in a topic.
    pub async fn message_count(&self, topic: Topic) -> usize {
        let mut count = 0;
        for partition in self.partitions_of(topic) {
            count += partition.log.read().await.len();
        }
        count
    }

    /// Closes the bus: subscriber streams end once they have drained their partition.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for parts in self.topics.values() {
            for partition in parts {
                partition.notify.notify_waiters();
            }
        }
    }

    fn partitions_of(&self, topic: Topic) -> &[Arc<Partition>] {
        self.topics.get(&topic).map(Vec::as_slice).unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn partition_stream(partition: Arc<Partition>, closed: Arc<AtomicBool>) -> MessageStream {
        Box::pin(stream::unfold(
            (partition, closed, 0usize),
            |(partition, closed, offset)| async move {
                loop {
                    let next = {
                        // Registered before the log is checked so a publish in
                        // between cannot be missed.
                        let notified = partition.notify.notified();
                        let message = partition.log.read().await.get(offset).cloned();
                        match message {
                            Some(message) => Some(message),
                            None if closed.load(Ordering::Acquire) => return None,
                            None => {
                                notified.await;
                                None
                            }
                        }
                    };

                    if let Some(message) = next {
                        return Some((Ok(message), (partition, closed, offset + 1)));
                    }
                }
            },
        ))
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<Delivery> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::PublishFailed {
                topic,
                reason: "bus is closed".to_string(),
            });
        }
        if self.take_injected_failure() {
            return Err(MessagingError::PublishFailed {
                topic,
                reason: "broker unavailable".to_string(),
            });
        }

        let partition_id = partition_for(key, self.partitions);
        let partition = self
            .partitions_of(topic)
            .get(partition_id as usize)
            .ok_or_else(|| MessagingError::PublishFailed {
                topic,
                reason: format!("partition {partition_id} does not exist"),
            })?;

        let offset = {
            let mut log = partition.log.write().await;
            let offset = log.len() as u64;
            log.push(BusMessage {
                topic,
                partition: partition_id,
                offset,
                key: key.to_string(),
                payload,
                published_at: Utc::now(),
            });
            offset
        };
        partition.notify.notify_waiters();

        Ok(Delivery {
            partition: partition_id,
            offset,
        })
    }

    async fn subscribe(&self, topic: Topic) -> Result<Vec<PartitionStream>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::SubscriptionFailed {
                topic,
                reason: "bus is closed".to_string(),
            });
        }

        Ok(self
            .partitions_of(topic)
            .iter()
            .enumerate()
            .map(|(index, partition)| PartitionStream {
                partition: index as u32,
                messages: Self::partition_stream(Arc::clone(partition), Arc::clone(&self.closed)),
            })
            .collect())
    }

    async fn read_all(&self, topic: Topic) -> Result<Vec<BusMessage>> {
        let mut messages = Vec::new();
        for partition in self.partitions_of(topic) {
            messages.extend(partition.log.read().await.iter().cloned());
        }
        Ok(messages)
    }

    fn partition_count(&self) -> u32 {
        self.partitions
    }
}
