//! Notification send/listen orchestration.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_types::config::NotificationConfig;
use parley_types::error::NotificationError;
use parley_types::notification::{Notification, truncate_content};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::feed::Feed;
use crate::notification::fanout::NotificationFanout;
use crate::notification::{FallbackDelivery, NotificationKey, NotificationRepository};
use crate::presence::PresenceTracker;
use crate::store::KeyValueStore;

/// Whether a notification may be sent again when one already exists for the
/// same (receiver, sender, trigger, event).
#[derive(Clone, Default)]
pub enum ResendPolicy {
    /// Always send.
    #[default]
    Always,
    /// Never send a duplicate.
    Never,
    /// Send once more than this much time has passed since the previous one.
    After(Duration),
    /// Decide from the previous notification.
    Custom(Arc<dyn Fn(&Notification) -> bool + Send + Sync>),
}

impl ResendPolicy {
    /// Whether a new notification is allowed given `previous`.
    pub fn allows(&self, previous: &Notification) -> bool {
        match self {
            ResendPolicy::Always => true,
            ResendPolicy::Never => false,
            ResendPolicy::After(window) => (Utc::now() - previous.date)
                .to_std()
                .map(|elapsed| elapsed > *window)
                .unwrap_or(false),
            ResendPolicy::Custom(predicate) => predicate(previous),
        }
    }
}

impl std::fmt::Debug for ResendPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResendPolicy::Always => f.write_str("Always"),
            ResendPolicy::Never => f.write_str("Never"),
            ResendPolicy::After(window) => f.debug_tuple("After").field(window).finish(),
            ResendPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parameters for [`NotificationService::send`].
#[derive(Debug, Clone)]
pub struct SendNotification {
    pub sender_user_id: String,
    pub receiver_user_id: String,
    pub trigger_id: Option<String>,
    pub event_id: String,
    pub content: Option<String>,
    pub resend: ResendPolicy,
}

impl SendNotification {
    fn key(&self) -> NotificationKey {
        NotificationKey {
            receiver_user_id: self.receiver_user_id.clone(),
            sender_user_id: self.sender_user_id.clone(),
            trigger_id: self.trigger_id.clone().filter(|t| !t.is_empty()),
            event_id: self.event_id.clone(),
        }
    }
}

/// What happened to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing sent: self-notification or the resend policy refused it.
    Suppressed,
    /// Receiver was online; pushed on their channel.
    Pushed(Notification),
    /// Receiver was offline; handed to the fallback path.
    Deferred(Notification),
}

impl Delivery {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Delivery::Suppressed => None,
            Delivery::Pushed(n) | Delivery::Deferred(n) => Some(n),
        }
    }
}

/// Sends notifications to users, live when they are online.
pub struct NotificationService<S, R, F> {
    fanout: NotificationFanout<S>,
    presence: PresenceTracker<S>,
    repository: R,
    fallback: F,
    config: NotificationConfig,
}

impl<S, R, F> NotificationService<S, R, F>
where
    S: KeyValueStore,
    R: NotificationRepository,
    F: FallbackDelivery,
{
    pub fn new(
        fanout: NotificationFanout<S>,
        presence: PresenceTracker<S>,
        repository: R,
        fallback: F,
        config: NotificationConfig,
    ) -> Self {
        Self {
            fanout,
            presence,
            repository,
            fallback,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Send a notification.
    ///
    /// Self-notifications are suppressed. When one already exists for the
    /// same key, `resend` decides. Content is truncated to the configured
    /// length. Online receivers get a push; offline ones go to the fallback.
    #[tracing::instrument(
        name = "notification.send",
        skip(self, req),
        fields(receiver = %req.receiver_user_id, event = %req.event_id)
    )]
    pub async fn send(&self, req: SendNotification) -> Result<Delivery, NotificationError> {
        if req.receiver_user_id.is_empty() {
            return Err(NotificationError::InvalidArgument(
                "missing receiver user id".to_string(),
            ));
        }
        if req.event_id.is_empty() {
            return Err(NotificationError::InvalidArgument(
                "missing event id".to_string(),
            ));
        }

        if req.sender_user_id == req.receiver_user_id {
            debug!("suppressed self-notification");
            return Ok(Delivery::Suppressed);
        }

        let key = req.key();
        if let Some(previous) = self.repository.latest(&key).await? {
            if !req.resend.allows(&previous) {
                debug!(previous_id = %previous.id, "suppressed by resend policy");
                return Ok(Delivery::Suppressed);
            }
        }

        let notification = Notification {
            id: Uuid::now_v7().to_string(),
            date: Utc::now(),
            trigger_id: req.trigger_id.clone().filter(|t| !t.is_empty()),
            event_id: req.event_id.clone(),
            content: req
                .content
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| truncate_content(c, self.config.content_max_len)),
            read: false,
        };
        self.repository.create(&key, &notification).await?;

        if self.presence.is_online(&req.receiver_user_id).await? {
            self.fanout.push(&req.receiver_user_id, &notification).await?;
            info!(notification_id = %notification.id, "notification pushed");
            Ok(Delivery::Pushed(notification))
        } else {
            self.fallback
                .deliver(&req.receiver_user_id, &notification)
                .await?;
            info!(notification_id = %notification.id, "notification deferred to fallback");
            Ok(Delivery::Deferred(notification))
        }
    }

    /// Stream notifications pushed to `user_id`.
    pub async fn listen(
        &self,
        token: &CancellationToken,
        user_id: &str,
    ) -> Result<Feed<Notification>, NotificationError> {
        self.fanout.subscribe(token, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryRepo {
        rows: Mutex<HashMap<String, Notification>>,
    }

    impl NotificationRepository for MemoryRepo {
        async fn latest(
            &self,
            key: &NotificationKey,
        ) -> Result<Option<Notification>, NotificationError> {
            Ok(self.rows.lock().unwrap().get(&key.dedupe_field()).cloned())
        }

        async fn create(
            &self,
            key: &NotificationKey,
            notification: &Notification,
        ) -> Result<(), NotificationError> {
            self.rows
                .lock()
                .unwrap()
                .insert(key.dedupe_field(), notification.clone());
            Ok(())
        }

        async fn list_for(&self, _receiver: &str) -> Result<Vec<Notification>, NotificationError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[derive(Default)]
    struct CountingFallback {
        delivered: Mutex<Vec<String>>,
    }

    impl FallbackDelivery for Arc<CountingFallback> {
        async fn deliver(
            &self,
            receiver_user_id: &str,
            _notification: &Notification,
        ) -> Result<(), NotificationError> {
            self.delivered
                .lock()
                .unwrap()
                .push(receiver_user_id.to_string());
            Ok(())
        }
    }

    struct Harness {
        service: NotificationService<MockStore, MemoryRepo, Arc<CountingFallback>>,
        presence: PresenceTracker<MockStore>,
        fallback: Arc<CountingFallback>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MockStore::default());
        let presence = PresenceTracker::new(Arc::clone(&store));
        let fallback = Arc::new(CountingFallback::default());
        let service = NotificationService::new(
            NotificationFanout::new(Arc::clone(&store), 8),
            presence.clone(),
            MemoryRepo::default(),
            Arc::clone(&fallback),
            NotificationConfig::default(),
        );
        Harness {
            service,
            presence,
            fallback,
        }
    }

    fn like(resend: ResendPolicy) -> SendNotification {
        SendNotification {
            sender_user_id: "alice".to_string(),
            receiver_user_id: "bob".to_string(),
            trigger_id: Some("post-1".to_string()),
            event_id: "like".to_string(),
            content: Some("x".repeat(100)),
            resend,
        }
    }

    #[tokio::test]
    async fn self_notification_is_suppressed() {
        let h = harness();
        let mut req = like(ResendPolicy::Always);
        req.receiver_user_id = "alice".to_string();
        assert_eq!(h.service.send(req).await.unwrap(), Delivery::Suppressed);
    }

    #[tokio::test]
    async fn online_receiver_gets_push_with_truncated_content() {
        let h = harness();
        h.presence.log("bob").await.unwrap();
        let token = CancellationToken::new();
        let mut feed = h.service.listen(&token, "bob").await.unwrap();

        let delivery = h.service.send(like(ResendPolicy::Always)).await.unwrap();
        let Delivery::Pushed(sent) = delivery else {
            panic!("expected push, got {delivery:?}");
        };
        assert_eq!(sent.content.as_deref().map(|c| c.chars().count()), Some(64));
        assert!(sent.content.as_deref().unwrap().ends_with("..."));

        let received = feed.next().await.unwrap();
        assert_eq!(received.id, sent.id);
    }

    #[tokio::test]
    async fn offline_receiver_is_deferred() {
        let h = harness();
        let delivery = h.service.send(like(ResendPolicy::Always)).await.unwrap();
        assert!(matches!(delivery, Delivery::Deferred(_)));
        assert_eq!(*h.fallback.delivered.lock().unwrap(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn resend_policies_gate_duplicates() {
        let h = harness();
        assert!(h.service.send(like(ResendPolicy::Never)).await.unwrap().notification().is_some());
        assert_eq!(
            h.service.send(like(ResendPolicy::Never)).await.unwrap(),
            Delivery::Suppressed
        );
        assert_eq!(
            h.service
                .send(like(ResendPolicy::After(Duration::from_secs(3600))))
                .await
                .unwrap(),
            Delivery::Suppressed
        );
        assert!(h.service
            .send(like(ResendPolicy::Custom(Arc::new(|_| true))))
            .await
            .unwrap()
            .notification()
            .is_some());
        assert!(h.service.send(like(ResendPolicy::Always)).await.unwrap().notification().is_some());
    }

    #[tokio::test]
    async fn empty_trigger_dedupes_with_no_trigger() {
        let h = harness();
        let mut first = like(ResendPolicy::Never);
        first.trigger_id = Some(String::new());
        let sent = h.service.send(first).await.unwrap();
        assert_eq!(sent.notification().unwrap().trigger_id, None);

        let mut again = like(ResendPolicy::Never);
        again.trigger_id = None;
        assert_eq!(h.service.send(again).await.unwrap(), Delivery::Suppressed);
    }

    #[tokio::test]
    async fn missing_event_is_rejected() {
        let h = harness();
        let mut req = like(ResendPolicy::Always);
        req.event_id.clear();
        assert!(matches!(
            h.service.send(req).await,
            Err(NotificationError::InvalidArgument(_))
        ));
    }
}
