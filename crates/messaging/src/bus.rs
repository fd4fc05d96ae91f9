use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{Result, Topic};

/// A message as stored in a topic partition.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: Topic,

    /// Partition the key hashed to.
    pub partition: u32,

    /// Position of the message within its partition.
    pub offset: u64,

    /// Partition key the producer supplied.
    pub key: String,

    /// Raw message body (a JSON-encoded envelope for inventory topics).
    pub payload: Vec<u8>,

    /// When the broker accepted the message.
    pub published_at: DateTime<Utc>,
}

/// Where a published message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: u32,
    pub offset: u64,
}

/// A stream of messages from one partition, in offset order.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<BusMessage>> + Send>>;

/// A subscription to a single partition of a topic.
pub struct PartitionStream {
    /// The partition this stream reads.
    pub partition: u32,

    /// Messages of the partition, oldest first.
    pub messages: MessageStream,
}

/// Append-only, partitioned log shared by the command side, the single
/// writer and the cache synchronizer.
///
/// Ordering is only guaranteed within a partition. Producers choose the
/// partition through the message key, so all messages sharing a key are
/// delivered in publication order. Delivery is at-least-once: consumers
/// must tolerate seeing a message again.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends a message to the partition selected by `key`.
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<Delivery>;

    /// Subscribes to every partition of a topic, starting at the earliest
    /// retained offset.
    async fn subscribe(&self, topic: Topic) -> Result<Vec<PartitionStream>>;

    /// Reads everything currently retained in a topic, partition by partition.
    async fn read_all(&self, topic: Topic) -> Result<Vec<BusMessage>>;

    /// Returns the number of partitions per topic.
    fn partition_count(&self) -> u32;
}

/// Maps a partition key onto a partition.
///
/// Uses 32-bit FNV-1a so the mapping is stable across processes and builds.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    if partitions <= 1 {
        return 0;
    }

    let hash = key
        .bytes()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME));
    hash % partitions
}
