use chrono::Utc;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Aggregate, InventoryEvent, InventoryItem};
use item_store::InMemoryItemStore;
use messaging::{EventEnvelope, EventPublisher, InMemoryEventBus};
use processor::{Applier, Pipeline, RetryPolicy, SingleWriter};

fn command_stream(reservations: usize) -> (AggregateId, Vec<(EventEnvelope, InventoryEvent)>) {
    let id = AggregateId::new();
    let mut item = InventoryItem::default();
    let mut stream = Vec::with_capacity(reservations + 1);

    let mut push = |item: &mut InventoryItem, event: InventoryEvent| {
        let now = Utc::now();
        let version = item.commit(&event, now).unwrap();
        stream.push((event.to_envelope(id, version, now).unwrap(), event));
    };

    let created = item
        .create(id, "SKU-BENCH", "Benchmark Widget", "", 1_000_000)
        .unwrap();
    push(&mut item, created);
    for _ in 0..reservations {
        let reserved = item.reserve_stock(1).unwrap();
        push(&mut item, reserved);
    }

    (id, stream)
}

fn bench_applier(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("processor/apply_100_envelopes", |b| {
        b.iter(|| {
            let (_, stream) = command_stream(99);
            rt.block_on(async {
                let applier = Applier::new(
                    InMemoryItemStore::new(),
                    EventPublisher::new(InMemoryEventBus::new(8)),
                );
                for (envelope, event) in &stream {
                    applier.apply(envelope, event).await.unwrap();
                }
            });
        });
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("processor/pipeline_100_messages", |b| {
        b.iter(|| {
            let (id, stream) = command_stream(99);
            let key = id.to_string();
            let messages: Vec<(messaging::Topic, Vec<u8>)> = stream
                .iter()
                .map(|(envelope, _)| (envelope.topic(), envelope.to_bytes().unwrap()))
                .collect();

            rt.block_on(async {
                let bus = InMemoryEventBus::new(8);
                let writer = SingleWriter::spawn(Applier::new(
                    InMemoryItemStore::new(),
                    EventPublisher::new(bus.clone()),
                ));
                let pipeline = Pipeline::new(writer.handle(), bus, RetryPolicy::default());
                for (topic, bytes) in &messages {
                    pipeline.process(*topic, &key, bytes).await.unwrap();
                }
                drop(pipeline);
                writer.shutdown().await;
            });
        });
    });
}

criterion_group!(benches, bench_applier, bench_pipeline);
criterion_main!(benches);
