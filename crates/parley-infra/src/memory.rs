//! In-memory store backend.
//!
//! Values live in a `DashMap` keyed by store key. Expiry is lazy: an expired
//! string is removed the next time its key is touched, or by
//! [`MemoryStore::purge_expired`]. Pub/sub goes through a [`PubSubHub`].

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parley_core::store::{KeyValueStore, Subscription};
use parley_types::error::StoreError;
use tracing::debug;

use crate::pubsub::PubSubHub;

/// Sorted-set score with a total order.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    ranked: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: f64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ranked.remove(&(Score(old), member.to_string()));
        }
        self.ranked.insert((Score(score), member.to_string()));
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Drop the lowest-ranked members until at most `max_len` remain.
    fn trim(&mut self, max_len: usize) -> usize {
        let mut removed = 0;
        while self.ranked.len() > max_len {
            if let Some((_, member)) = self.ranked.pop_first() {
                self.scores.remove(&member);
                removed += 1;
            }
        }
        removed
    }
}

#[derive(Debug)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(SortedSet),
    Set(BTreeSet<String>),
}

impl Value {
    fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.len() == 0,
            Value::Set(s) => s.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

/// Process-local store backend.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    hub: PubSubHub,
}

impl MemoryStore {
    pub fn new(hub: PubSubHub) -> Self {
        Self {
            entries: DashMap::new(),
            hub,
        }
    }

    pub fn hub(&self) -> &PubSubHub {
        &self.hub
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "purged expired entries");
        }
        purged
    }

    fn expire(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }

    fn drop_if_empty(&self, key: &str) {
        self.entries
            .remove_if(key, |_, entry| entry.value.is_empty_collection());
    }

    /// Run `f` against the live value at `key`, if any.
    fn read<T>(
        &self,
        key: &str,
        f: impl FnOnce(&Value) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        self.expire(key);
        match self.entries.get(key) {
            Some(entry) => f(&entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// Run `f` against the value at `key`, creating it with `init` if absent.
    fn write<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.expire(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(init()));
        f(&mut entry.value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(PubSubHub::default())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.expire(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.expire(key);
        Ok(self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::Hash(h) => Ok(h.get(field).cloned()),
                _ => Err(wrong_type(key)),
            })?
            .flatten())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.write(
            key,
            || Value::Hash(HashMap::new()),
            |v| match v {
                Value::Hash(h) => {
                    h.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::Hash(h) => Ok(h.clone()),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.expire(key);
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Hash(h) => h.remove(field).is_some(),
                _ => return Err(wrong_type(key)),
            },
            None => false,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.write(
            key,
            || Value::ZSet(SortedSet::default()),
            |v| match v {
                Value::ZSet(z) => {
                    z.insert(member, score);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::ZSet(z) => Ok(z
                    .ranked
                    .range((Score(min), String::new())..)
                    .take_while(|(score, _)| score.0 <= max)
                    .skip(offset)
                    .take(count)
                    .map(|(_, member)| member.clone())
                    .collect()),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        if stop < start {
            return Ok(Vec::new());
        }
        Ok(self
            .read(key, |value| match value {
                Value::ZSet(z) => Ok(z
                    .ranked
                    .iter()
                    .rev()
                    .skip(start)
                    .take(stop - start + 1)
                    .map(|(_, member)| member.clone())
                    .collect()),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::ZSet(z) => Ok(z.len()),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or(0))
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> Result<usize, StoreError> {
        self.expire(key);
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::ZSet(z) => z.trim(max_len),
                _ => return Err(wrong_type(key)),
            },
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.write(
            key,
            || Value::Set(BTreeSet::new()),
            |v| match v {
                Value::Set(s) => Ok(s.insert(member.to_string())),
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.expire(key);
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Set(s) => s.remove(member),
                _ => return Err(wrong_type(key)),
            },
            None => false,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::Set(s) => Ok(s.contains(member)),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read(key, |value| match value {
                Value::Set(s) => Ok(s.iter().cloned().collect()),
                _ => Err(wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        Ok(self.hub.publish(channel, payload))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        Ok(self.hub.subscribe(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strings_expire_lazily() {
        let store = MemoryStore::default();
        store
            .set("k", "v", Some(Duration::from_millis(40)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.ttl("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.ttl("k").await.unwrap().is_none());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn persistent_string_has_no_ttl() {
        let store = MemoryStore::default();
        store.set("k", "v", None).await.unwrap();
        assert!(store.ttl("k").await.unwrap().is_none());
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::default();
        store.set("gone", "v", Some(Duration::from_millis(10))).await.unwrap();
        store.set("kept", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let store = MemoryStore::default();
        store.sadd("s", "m").await.unwrap();

        assert!(matches!(store.get("s").await, Err(StoreError::WrongType(_))));
        assert!(matches!(store.hset("s", "f", "v").await, Err(StoreError::WrongType(_))));
        assert!(matches!(store.zadd("s", 1.0, "m").await, Err(StoreError::WrongType(_))));

        // SET replaces a value of any type.
        store.set("s", "now-a-string", None).await.unwrap();
        assert_eq!(store.get("s").await.unwrap().as_deref(), Some("now-a-string"));
    }

    #[tokio::test]
    async fn zadd_rescores_existing_member() {
        let store = MemoryStore::default();
        store.zadd("z", 5.0, "a").await.unwrap();
        store.zadd("z", 1.0, "b").await.unwrap();
        store.zadd("z", 0.0, "a").await.unwrap();

        assert_eq!(store.zcard("z").await.unwrap(), 2);
        assert_eq!(
            store.zrange_by_score("z", f64::NEG_INFINITY, f64::INFINITY, 0, 10).await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn emptied_collections_disappear() {
        let store = MemoryStore::default();
        store.hset("h", "f", "v").await.unwrap();
        assert!(store.hdel("h", "f").await.unwrap());
        store.sadd("h", "now-a-set").await.unwrap();
    }
}
