//! Runtime-selected store backend.
//!
//! `KeyValueStore` uses RPITIT and is not dyn-compatible, so the backend
//! chosen by configuration is wrapped in an enum that forwards every call.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use parley_core::store::{KeyValueStore, Subscription};
use parley_types::config::{StoreBackend, StoreConfig};
use parley_types::error::StoreError;
use tracing::info;

use crate::memory::MemoryStore;
use crate::pubsub::PubSubHub;
use crate::sqlite::pool::default_database_url;
use crate::sqlite::store::SqliteStore;

pub enum AnyStore {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl AnyStore {
    pub fn backend(&self) -> StoreBackend {
        match self {
            AnyStore::Memory(_) => StoreBackend::Memory,
            AnyStore::Sqlite(_) => StoreBackend::Sqlite,
        }
    }

    /// Remove expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        match self {
            AnyStore::Memory(s) => Ok(s.purge_expired() as u64),
            AnyStore::Sqlite(s) => s.purge_expired().await,
        }
    }
}

/// Open the backend named by `config`.
///
/// SQLite uses `config.database_url`, falling back to `parley.db` inside
/// `data_dir`. Expired entries are purged on open.
pub async fn open_store(config: &StoreConfig, data_dir: &Path) -> Result<AnyStore, StoreError> {
    let hub = PubSubHub::new(config.broadcast_capacity);
    let store = match config.backend {
        StoreBackend::Memory => AnyStore::Memory(MemoryStore::new(hub)),
        StoreBackend::Sqlite => {
            tokio::fs::create_dir_all(data_dir)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", data_dir.display())))?;
            let url = config
                .database_url
                .clone()
                .unwrap_or_else(|| default_database_url(data_dir));
            AnyStore::Sqlite(SqliteStore::open(&url, hub).await?)
        }
    };

    let purged = store.purge_expired().await?;
    info!(backend = %store.backend(), purged, "store opened");
    Ok(store)
}

macro_rules! forward {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Memory($store) => $call.await,
            AnyStore::Sqlite($store) => $call.await,
        }
    };
}

impl KeyValueStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        forward!(self, s => s.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        forward!(self, s => s.set(key, value, ttl))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        forward!(self, s => s.del(key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        forward!(self, s => s.ttl(key))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        forward!(self, s => s.hget(key, field))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        forward!(self, s => s.hset(key, field, value))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        forward!(self, s => s.hgetall(key))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        forward!(self, s => s.hdel(key, field))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        forward!(self, s => s.zadd(key, score, member))
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        forward!(self, s => s.zrange_by_score(key, min, max, offset, count))
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        forward!(self, s => s.zrevrange(key, start, stop))
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        forward!(self, s => s.zcard(key))
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> Result<usize, StoreError> {
        forward!(self, s => s.ztrim(key, max_len))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        forward!(self, s => s.sadd(key, member))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        forward!(self, s => s.srem(key, member))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        forward!(self, s => s.sismember(key, member))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        forward!(self, s => s.smembers(key))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        forward!(self, s => s.publish(channel, payload))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        forward!(self, s => s.subscribe(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = open_store(&config, dir.path()).await.unwrap();
        assert_eq!(store.backend(), StoreBackend::Memory);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn opens_sqlite_backend_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let store = open_store(&StoreConfig::default(), &data_dir).await.unwrap();
        assert_eq!(store.backend(), StoreBackend::Sqlite);
        assert!(data_dir.join("parley.db").exists());
    }
}
