//! Wiring for the inventory sync system.
//!
//! [`Runtime`] assembles the command side, the single-writer processor and
//! the cache synchronizer around one event bus, choosing PostgreSQL and
//! Redis or their in-memory counterparts from the [`Config`].

pub mod config;
pub mod observability;

use std::sync::Arc;

use domain::{InventoryService, SeededItemRepository};
use item_store::{InMemoryItemStore, ItemStore, PostgresItemStore, StoreError};
use messaging::{EventPublisher, InMemoryEventBus};
use processor::{DeadLetterReplayer, EventProcessor, ProcessorError};
use projections::{
    Cache, CacheError, CacheSynchronizer, InMemoryCache, ItemReader, ProjectionError,
    ProjectionProcessor, ProjectionWorker, RedisCache,
};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use config::{Config, ConfigError, LogFormat};

/// The authoritative store, whichever backend it is.
pub type SharedStore = Arc<dyn ItemStore>;

/// The read-side cache, whichever backend it is.
pub type SharedCache = Arc<dyn Cache>;

/// The command side, seeded from the authoritative store.
pub type CommandService = InventoryService<SeededItemRepository<SharedStore>, InMemoryEventBus>;

/// Connections opened against a PostgreSQL store.
const DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Errors raised while starting the system.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

/// The running system.
pub struct Runtime {
    service: CommandService,
    reader: ItemReader<SharedStore, SharedCache>,
    replayer: DeadLetterReplayer<InMemoryEventBus>,
    bus: InMemoryEventBus,
    processor: EventProcessor,
    projections: ProjectionWorker,
}

impl Runtime {
    /// Connects the configured backends and starts every consumer.
    pub async fn start(config: &Config) -> Result<Self, RuntimeError> {
        let store = connect_store(config).await?;
        let cache = connect_cache(config).await?;
        Self::with_backends(config, store, cache).await
    }

    /// Starts every consumer over the given store and cache.
    pub async fn with_backends(
        config: &Config,
        store: SharedStore,
        cache: SharedCache,
    ) -> Result<Self, RuntimeError> {
        let bus = InMemoryEventBus::new(config.bus_partitions);

        let processor =
            EventProcessor::start(Arc::clone(&store), bus.clone(), config.retry.clone()).await?;

        let mut projections = ProjectionProcessor::new();
        projections.register(Box::new(CacheSynchronizer::new(
            Arc::clone(&cache),
            config.cache_ttls,
        )));
        let projections = projections.start(&bus).await?;

        tracing::info!(
            partitions = config.bus_partitions,
            max_retries = config.retry.max_retries,
            "inventory sync started"
        );

        Ok(Self {
            service: InventoryService::new(
                SeededItemRepository::new(Arc::clone(&store)),
                EventPublisher::new(bus.clone()),
            ),
            reader: ItemReader::new(store, cache, config.cache_ttls),
            replayer: DeadLetterReplayer::new(bus.clone()),
            bus,
            processor,
            projections,
        })
    }

    /// The command side.
    pub fn service(&self) -> &CommandService {
        &self.service
    }

    /// The cache-first read path.
    pub fn reader(&self) -> &ItemReader<SharedStore, SharedCache> {
        &self.reader
    }

    pub fn replayer(&self) -> &DeadLetterReplayer<InMemoryEventBus> {
        &self.replayer
    }

    pub fn bus(&self) -> &InMemoryEventBus {
        &self.bus
    }

    /// Stops consuming, finishing in-flight work first.
    ///
    /// Envelopes still in the command outbox get one more publish attempt.
    /// The processor stops before the projections so the last
    /// confirmations it publishes can still reach the cache.
    pub async fn shutdown(self) {
        if let Err(e) = self.service.publish_pending().await {
            tracing::error!(error = %e, "command outbox not drained before shutdown");
        }
        self.processor.shutdown().await;
        self.projections.shutdown().await;
        self.bus.close();
        tracing::info!("inventory sync stopped");
    }
}

async fn connect_store(config: &Config) -> Result<SharedStore, RuntimeError> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(DATABASE_MAX_CONNECTIONS)
                .connect(url)
                .await?;
            let store = PostgresItemStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL item store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; item store is in memory");
            Ok(Arc::new(InMemoryItemStore::new()))
        }
    }
}

async fn connect_cache(config: &Config) -> Result<SharedCache, RuntimeError> {
    match &config.redis_url {
        Some(url) => {
            let cache = RedisCache::connect(url).await?;
            tracing::info!("using Redis cache");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::warn!("REDIS_URL not set; cache is in memory");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}
