//! The read-side cache abstraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::CacheError;

/// A string-keyed cache whose entries expire.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes the given keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Removes every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// JSON helpers on top of [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + Sync,
    {
        self.set(key, serde_json::to_string(value)?, ttl).await
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}

#[async_trait]
impl<T: Cache + ?Sized> Cache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        (**self).delete(keys).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        (**self).delete_prefix(prefix).await
    }
}

/// Expiry of each kind of cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Entries keyed by id and by SKU.
    pub item: Duration,

    /// Stock status entries; kept short since stock moves most often.
    pub stock: Duration,

    /// Paginated list entries.
    pub list: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            item: Duration::from_secs(300),
            stock: Duration::from_secs(30),
            list: Duration::from_secs(60),
        }
    }
}
