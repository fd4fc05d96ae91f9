//! Read side of the inventory sync system.
//!
//! This crate provides:
//! - [`Cache`] with in-memory and Redis backends
//! - [`CacheSynchronizer`], the projection turning confirmations into
//!   cache updates and invalidations
//! - [`ProjectionProcessor`] for feeding the confirmed topic to projections
//! - [`ItemReader`], the cache-first read path with store fallback

pub mod cache;
pub mod error;
pub mod keys;
pub mod memory;
pub mod model;
pub mod processor;
pub mod projection;
pub mod reader;
pub mod redis_cache;
pub mod synchronizer;

pub use cache::{Cache, CacheExt, CacheTtls};
pub use error::{CacheError, ProjectionError, Result};
pub use memory::InMemoryCache;
pub use model::{ItemPage, StockStatus};
pub use processor::{ProjectionProcessor, ProjectionWorker};
pub use projection::{Projection, ProjectionPosition};
pub use reader::ItemReader;
pub use redis_cache::RedisCache;
pub use synchronizer::CacheSynchronizer;
