//! Integration tests: concurrent publishers → partitioned subscribers.

use std::collections::HashMap;

use futures_util::StreamExt;
use messaging::{
    AggregateId, EventBus, EventEnvelope, EventPublisher, EventType, InMemoryEventBus, Topic,
};

fn adjusted(aggregate_id: AggregateId, seq: u32) -> EventEnvelope {
    EventEnvelope::builder()
        .event_type(EventType::StockAdjusted)
        .aggregate_id(aggregate_id)
        .payload_raw(serde_json::json!({"delta": 1, "newQuantity": seq}))
        .build()
        .unwrap()
}

#[tokio::test]
async fn per_aggregate_order_survives_concurrent_publishers() {
    let bus = InMemoryEventBus::new(4);
    let publisher = EventPublisher::new(bus.clone());
    let items: Vec<AggregateId> = (0..6).map(|_| AggregateId::new()).collect();

    // One task per item, all publishing at the same time.
    let mut handles = Vec::new();
    for id in items.clone() {
        let publisher = publisher.clone();
        handles.push(tokio::spawn(async move {
            for seq in 0..25 {
                publisher.publish(&adjusted(id, seq)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = bus.message_count(Topic::StockMutation).await;
    assert_eq!(total, items.len() * 25);

    let mut last_seen: HashMap<AggregateId, i64> = HashMap::new();
    let mut seen = 0;
    for mut partition in bus.subscribe(Topic::StockMutation).await.unwrap() {
        let retained = bus
            .read_all(Topic::StockMutation)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.partition == partition.partition)
            .count();

        for _ in 0..retained {
            let message = partition.messages.next().await.unwrap().unwrap();
            let envelope = EventEnvelope::from_bytes(&message.payload).unwrap();
            let seq = envelope.payload["newQuantity"].as_i64().unwrap();
            let previous = last_seen.insert(envelope.aggregate_id, seq).unwrap_or(-1);
            assert_eq!(seq, previous + 1, "out of order for {}", envelope.aggregate_id);
            seen += 1;
        }
    }

    assert_eq!(seen, total);
    assert!(last_seen.values().all(|&seq| seq == 24));
}

#[tokio::test]
async fn topics_are_isolated() {
    let bus = InMemoryEventBus::new(2);
    let publisher = EventPublisher::new(bus.clone());
    let id = AggregateId::new();

    publisher.publish(&adjusted(id, 0)).await.unwrap();

    assert_eq!(bus.message_count(Topic::StockMutation).await, 1);
    for topic in [Topic::ItemLifecycle, Topic::Confirmed, Topic::DeadLetter] {
        assert_eq!(bus.message_count(topic).await, 0);
    }
}
