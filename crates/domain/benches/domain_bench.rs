use chrono::Utc;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CreateItem, InMemoryItemRepository, InventoryEvent, InventoryItem,
    InventoryService, ReleaseStock, ReserveStock,
};
use messaging::{EventEnvelope, EventPublisher, InMemoryEventBus};

fn created_item(quantity: i64) -> InventoryItem {
    let mut item = InventoryItem::default();
    let event = item
        .create(AggregateId::new(), "SKU-BENCH", "Benchmark Widget", "", quantity)
        .unwrap();
    item.commit(&event, Utc::now()).unwrap();
    item
}

fn bench_reserve_release(c: &mut Criterion) {
    let item = created_item(1_000);

    c.bench_function("domain/reserve_release", |b| {
        b.iter(|| {
            let mut item = item.clone();
            let reserve = item.reserve_stock(10).unwrap();
            item.commit(&reserve, Utc::now()).unwrap();
            let release = item.release_stock(10).unwrap();
            item.commit(&release, Utc::now()).unwrap();
        });
    });
}

fn bench_envelope_round_trip(c: &mut Criterion) {
    let item = created_item(100);
    let event = item.adjust_stock(-5).unwrap();
    let id = item.id().unwrap();

    c.bench_function("domain/envelope_encode_decode", |b| {
        b.iter(|| {
            let envelope = event.to_envelope(id, item.version().next(), Utc::now()).unwrap();
            let bytes = envelope.to_bytes().unwrap();
            let decoded = EventEnvelope::from_bytes(&bytes).unwrap();
            InventoryEvent::from_envelope(&decoded).unwrap();
        });
    });
}

fn bench_create_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = InventoryService::new(
                    InMemoryItemRepository::new(),
                    EventPublisher::new(InMemoryEventBus::new(8)),
                );
                service
                    .create_item(CreateItem::new("SKU-BENCH", "Benchmark Widget", 100))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_command_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = InventoryService::new(
        InMemoryItemRepository::new(),
        EventPublisher::new(InMemoryEventBus::new(8)),
    );
    let cmd = CreateItem::new("SKU-BENCH", "Benchmark Widget", 1_000);
    let id = cmd.item_id;
    rt.block_on(async { service.create_item(cmd).await.unwrap() });

    c.bench_function("domain/reserve_release_commands", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.reserve_stock(ReserveStock::new(id, 1)).await.unwrap();
                service.release_stock(ReleaseStock::new(id, 1)).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_envelope_round_trip,
    bench_create_item,
    bench_command_cycle,
);
criterion_main!(benches);
