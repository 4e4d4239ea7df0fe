//! Out-of-band notifications.
//!
//! `NotificationFanout` pushes notifications over per-user channels;
//! `NotificationService` decides whether to send at all, persists through a
//! [`NotificationRepository`], and routes to push or fallback delivery by
//! presence.

pub mod fanout;
pub mod service;

use std::future::Future;

use parley_types::error::NotificationError;
use parley_types::notification::Notification;

/// Identifies a notification for deduplication: who fired which event on
/// which entity, for whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub receiver_user_id: String,
    pub sender_user_id: String,
    pub trigger_id: Option<String>,
    pub event_id: String,
}

impl NotificationKey {
    /// Field name unique per (sender, trigger, event) within a receiver.
    ///
    /// Each part is length-prefixed, so ids containing `:` cannot collide.
    /// An empty trigger is the same as no trigger.
    pub fn dedupe_field(&self) -> String {
        let trigger = match self.trigger_id.as_deref() {
            Some(trigger) if !trigger.is_empty() => format!("{}:{trigger}", trigger.len()),
            _ => "-".to_string(),
        };
        format!(
            "{}:{}{trigger}{}:{}",
            self.sender_user_id.len(),
            self.sender_user_id,
            self.event_id.len(),
            self.event_id
        )
    }
}

/// Persistence for sent notifications.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait NotificationRepository: Send + Sync {
    /// The most recent notification recorded for `key`, if any.
    fn latest(
        &self,
        key: &NotificationKey,
    ) -> impl Future<Output = Result<Option<Notification>, NotificationError>> + Send;

    /// Record a notification sent for `key`.
    fn create(
        &self,
        key: &NotificationKey,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;

    /// Every recorded notification for a receiver, newest first.
    fn list_for(
        &self,
        receiver_user_id: &str,
    ) -> impl Future<Output = Result<Vec<Notification>, NotificationError>> + Send;
}

/// Delivery path for receivers who are offline (email, mobile push, ...).
pub trait FallbackDelivery: Send + Sync {
    fn deliver(
        &self,
        receiver_user_id: &str,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sender: &str, trigger: Option<&str>, event: &str) -> NotificationKey {
        NotificationKey {
            receiver_user_id: "bob".to_string(),
            sender_user_id: sender.to_string(),
            trigger_id: trigger.map(str::to_string),
            event_id: event.to_string(),
        }
    }

    #[test]
    fn empty_trigger_matches_no_trigger() {
        assert_eq!(
            key("alice", Some(""), "like").dedupe_field(),
            key("alice", None, "like").dedupe_field()
        );
        assert_ne!(
            key("alice", Some("p1"), "like").dedupe_field(),
            key("alice", None, "like").dedupe_field()
        );
    }

    #[test]
    fn separators_inside_ids_do_not_collide() {
        assert_ne!(
            key("a:b", Some("c"), "e").dedupe_field(),
            key("a", Some("b:c"), "e").dedupe_field()
        );
        assert_ne!(
            key("a", Some("b"), "c:e").dedupe_field(),
            key("a", Some("b:c"), "e").dedupe_field()
        );
        assert_ne!(
            key("a", Some("-"), "e").dedupe_field(),
            key("a", None, "e").dedupe_field()
        );
    }
}
