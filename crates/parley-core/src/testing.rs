//! Mutex-backed store used by this crate's unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use parley_types::error::StoreError;
use tokio::sync::broadcast;

use crate::store::{KeyValueStore, Subscription};

#[derive(Default)]
struct State {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, Vec<(f64, String)>>,
    sets: HashMap<String, BTreeSet<String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl State {
    fn live_string(&mut self, key: &str) -> Option<&(String, Option<Instant>)> {
        if let Some((_, Some(at))) = self.strings.get(key) {
            if *at <= Instant::now() {
                self.strings.remove(key);
                return None;
            }
        }
        self.strings.get(key)
    }

    fn sorted(&mut self, key: &str) -> &mut Vec<(f64, String)> {
        let zset = self.zsets.entry(key.to_string()).or_default();
        zset.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        zset
    }
}

#[derive(Default)]
pub struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(f(&mut state))
    }
}

impl KeyValueStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with(|s| s.live_string(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with(|s| {
            s.strings
                .insert(key.to_string(), (value.to_string(), ttl.map(|t| Instant::now() + t)));
        })
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.with(|s| {
            let string = s.strings.remove(key).is_some();
            let hash = s.hashes.remove(key).is_some();
            let zset = s.zsets.remove(key).is_some();
            let set = s.sets.remove(key).is_some();
            string || hash || zset || set
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.with(|s| {
            s.live_string(key)
                .and_then(|(_, at)| *at)
                .map(|at| at.saturating_duration_since(Instant::now()))
        })
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.with(|s| s.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with(|s| {
            s.hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.with(|s| s.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with(|s| {
            s.hashes
                .get_mut(key)
                .is_some_and(|h| h.remove(field).is_some())
        })
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.with(|s| {
            let zset = s.zsets.entry(key.to_string()).or_default();
            zset.retain(|(_, m)| m != member);
            zset.push((score, member.to_string()));
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.with(|s| {
            s.sorted(key)
                .iter()
                .filter(|(score, _)| *score >= min && *score <= max)
                .skip(offset)
                .take(count)
                .map(|(_, m)| m.clone())
                .collect()
        })
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        self.with(|s| {
            s.sorted(key)
                .iter()
                .rev()
                .skip(start)
                .take(stop.saturating_sub(start) + 1)
                .map(|(_, m)| m.clone())
                .collect()
        })
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        self.with(|s| s.zsets.get(key).map_or(0, Vec::len))
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> Result<usize, StoreError> {
        self.with(|s| {
            let zset = s.sorted(key);
            let excess = zset.len().saturating_sub(max_len);
            zset.drain(..excess);
            excess
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with(|s| s.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with(|s| s.sets.get_mut(key).is_some_and(|set| set.remove(member)))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with(|s| s.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with(|s| {
            s.sets
                .get(key)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        self.with(|s| {
            s.channels
                .get(channel)
                .and_then(|tx| tx.send(payload.to_string()).ok())
                .unwrap_or(0)
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.with(|s| {
            let tx = s
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(64).0);
            Subscription::new(channel, tx.subscribe(), || {})
        })
    }
}
