//! In-process publish/subscribe hub.
//!
//! Each channel is a `tokio::sync::broadcast` sender kept in a `DashMap`.
//! A channel is created on first subscribe and removed when its last
//! subscription is released. Publishing to a channel nobody listens on
//! reaches zero receivers and is not an error.

use std::sync::Arc;

use dashmap::DashMap;
use parley_core::store::Subscription;
use tokio::sync::broadcast;
use tracing::debug;

/// Default per-channel buffer. Subscribers falling further behind skip payloads.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct PubSubHub {
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl PubSubHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Send `payload` to every live subscription. Returns how many it reached.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        match self.channels.get(channel) {
            Some(tx) => tx.send(payload.to_string()).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to `channel`. Publishes issued after this returns are
    /// delivered to the subscription.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let rx = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channels = Arc::clone(&self.channels);
        let name = channel.to_string();
        debug!(channel, "subscription opened");

        Subscription::new(channel, rx, move || {
            if channels
                .remove_if(&name, |_, tx| tx.receiver_count() == 0)
                .is_some()
            {
                debug!(channel = %name, "channel dropped after last subscriber left");
            }
        })
    }

    /// Number of channels with at least one subscription (or one being released).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let hub = PubSubHub::default();
        assert_eq!(hub.publish("ch", "x"), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_publish() {
        let hub = PubSubHub::default();
        let mut a = hub.subscribe("ch");
        let mut b = hub.subscribe("ch");

        assert_eq!(hub.publish("ch", "hello"), 2);
        assert_eq!(a.recv().await.as_deref(), Some("hello"));
        assert_eq!(b.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn channel_removed_after_last_release() {
        let hub = PubSubHub::default();
        let a = hub.subscribe("ch");
        let b = hub.subscribe("ch");
        assert_eq!(hub.subscriber_count("ch"), 2);

        a.close();
        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.subscriber_count("ch"), 1);

        b.close();
        assert_eq!(hub.channel_count(), 0);
        assert_eq!(hub.publish("ch", "late"), 0);
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let hub = PubSubHub::default();
        let mut a = hub.subscribe("a");
        let _b = hub.subscribe("b");

        assert_eq!(hub.publish("b", "for-b"), 1);
        assert_eq!(hub.publish("a", "for-a"), 1);
        assert_eq!(a.recv().await.as_deref(), Some("for-a"));
    }
}
