//! Keyed read/write lock.
//!
//! Serializes multi-step read-modify-write sequences against the store. Keys
//! hash onto a fixed pool of `tokio::sync::RwLock` shards, so memory stays
//! bounded no matter how many distinct keys are ever locked. Two keys sharing
//! a shard contend with each other; they are never reported as the same key.
//!
//! The lock is process-local. Deployments running several processes against
//! one shared store need an external coordinator.
//!
//! Callers must not hold two guards at once: two keys may hash to the same
//! shard, and a second acquisition would then deadlock.

use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Default shard count.
pub const DEFAULT_SHARDS: usize = 64;

/// A sharded, keyed read/write lock.
pub struct KeyedLock {
    shards: Box<[Arc<RwLock<()>>]>,
    hasher: RandomState,
}

impl KeyedLock {
    /// Create a lock with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Arc::new(RwLock::new(())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &str) -> Arc<RwLock<()>> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        Arc::clone(&self.shards[index])
    }

    /// Acquire exclusive access for `key`.
    pub async fn lock(&self, key: &str) -> KeyedWriteGuard {
        let guard = self.shard(key).write_owned().await;
        KeyedWriteGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Acquire shared access for `key`.
    pub async fn rlock(&self, key: &str) -> KeyedReadGuard {
        let guard = self.shard(key).read_owned().await;
        KeyedReadGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl std::fmt::Debug for KeyedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLock")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Exclusive hold on a key. Released on drop or [`unlock`](Self::unlock).
#[derive(Debug)]
pub struct KeyedWriteGuard {
    key: String,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl KeyedWriteGuard {
    /// The key this guard was acquired for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unlock(self) {}
}

/// Shared hold on a key. Released on drop or [`unlock`](Self::unlock).
#[derive(Debug)]
pub struct KeyedReadGuard {
    key: String,
    _guard: OwnedRwLockReadGuard<()>,
}

impl KeyedReadGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unlock(self) {}
}
