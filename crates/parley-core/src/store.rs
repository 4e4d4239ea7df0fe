//! Key-value store port.
//!
//! Defines the shared-backend interface every Parley service is built on:
//! strings with TTL, hashes, sorted sets, sets, and publish/subscribe.
//! Implementations live in parley-infra.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parley_types::error::StoreError;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Trait for the shared key-value backend.
///
/// Every primitive is individually safe for concurrent use. Sequences of
/// primitives are not atomic; callers serialize them with
/// [`KeyedLock`](crate::lock::KeyedLock).
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KeyValueStore: Send + Sync {
    /// Get a string value. Returns None if the key is missing or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Set a string value, optionally expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a key of any type. Returns whether something was removed.
    fn del(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Remaining time to live. None if the key is missing or never expires.
    fn ttl(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Duration>, StoreError>> + Send;

    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn hgetall(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, StoreError>> + Send;

    fn hdel(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Insert or re-score a sorted-set member.
    fn zadd(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Members with `min <= score <= max`, ascending by (score, member),
    /// skipping `offset` and returning at most `count`. `max` may be infinite.
    fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Members by descending rank, `start..=stop` (0 is the highest score).
    fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn zcard(&self, key: &str) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Remove the lowest-ranked members so at most `max_len` remain.
    /// Returns how many were removed.
    fn ztrim(
        &self,
        key: &str,
        max_len: usize,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Add a set member. Returns false if it was already present.
    fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Remove a set member. Returns false if it was absent.
    fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn sismember(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn smembers(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Publish a payload. Returns the number of subscriptions it reached.
    fn publish(
        &self,
        channel: &str,
        payload: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Subscribe to a channel.
    ///
    /// The returned future resolving is the subscription acknowledgment:
    /// every publish issued after it resolves reaches this subscription.
    fn subscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription to one pub/sub channel.
///
/// Dropping (or [`close`](Self::close)-ing) the subscription releases it in
/// the backend. The feed receiver is dropped before the release hook runs,
/// so the backend observes the subscriber as gone.
pub struct Subscription {
    channel: String,
    feed: Option<broadcast::Receiver<String>>,
    release: Option<ReleaseHook>,
}

impl Subscription {
    /// Wrap a broadcast receiver with a hook run on release.
    pub fn new(
        channel: impl Into<String>,
        feed: broadcast::Receiver<String>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            feed: Some(feed),
            release: Some(Box::new(release)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload. None once the channel is closed.
    ///
    /// A subscriber that falls behind the channel buffer skips the payloads
    /// it missed and keeps receiving.
    pub async fn recv(&mut self) -> Option<String> {
        let feed = self.feed.as_mut()?;
        loop {
            match feed.recv().await {
                Ok(payload) => return Some(payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, skipping payloads");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription now.
    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.feed.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("open", &self.feed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn recv_delivers_payloads_in_order() {
        let (tx, rx) = broadcast::channel(8);
        let mut sub = Subscription::new("ch", rx, || {});

        tx.send("one".to_string()).unwrap();
        tx.send("two".to_string()).unwrap();

        assert_eq!(sub.recv().await.as_deref(), Some("one"));
        assert_eq!(sub.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn recv_returns_none_when_channel_closes() {
        let (tx, rx) = broadcast::channel::<String>(8);
        let mut sub = Subscription::new("ch", rx, || {});
        drop(tx);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = Subscription::new("ch", rx, || {});

        for i in 0..5 {
            tx.send(format!("p{i}")).unwrap();
        }

        // The oldest payloads were overwritten; the newest survive.
        assert_eq!(sub.recv().await.as_deref(), Some("p3"));
        assert_eq!(sub.recv().await.as_deref(), Some("p4"));
    }

    #[test]
    fn release_runs_once_after_receiver_is_gone() {
        let (tx, rx) = broadcast::channel::<String>(8);
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_hook = Arc::clone(&seen);
        let tx_hook = tx.clone();

        let sub = Subscription::new("ch", rx, move || {
            seen_hook.store(tx_hook.receiver_count(), Ordering::SeqCst);
        });
        assert_eq!(tx.receiver_count(), 1);

        sub.close();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
