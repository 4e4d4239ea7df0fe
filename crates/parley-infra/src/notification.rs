//! Notification persistence and offline delivery.

use std::sync::Arc;

use parley_core::keys;
use parley_core::notification::{FallbackDelivery, NotificationKey, NotificationRepository};
use parley_core::store::KeyValueStore;
use parley_types::codec;
use parley_types::error::NotificationError;
use parley_types::notification::Notification;
use tracing::info;

/// Keeps the latest notification per dedupe key in the receiver's
/// `notifications:{user_id}` hash.
pub struct KvNotificationRepository<S> {
    store: Arc<S>,
}

impl<S> KvNotificationRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> NotificationRepository for KvNotificationRepository<S> {
    async fn latest(&self, key: &NotificationKey) -> Result<Option<Notification>, NotificationError> {
        let blob = self
            .store
            .hget(
                &keys::user_notifications(&key.receiver_user_id),
                &key.dedupe_field(),
            )
            .await?;
        match blob {
            Some(blob) => Ok(Some(codec::decode(&blob)?)),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        key: &NotificationKey,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        let blob = codec::encode(notification)?;
        self.store
            .hset(
                &keys::user_notifications(&key.receiver_user_id),
                &key.dedupe_field(),
                &blob,
            )
            .await?;
        Ok(())
    }

    async fn list_for(&self, receiver_user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        let blobs = self
            .store
            .hgetall(&keys::user_notifications(receiver_user_id))
            .await?;
        let mut notifications = blobs
            .values()
            .map(|blob| codec::decode::<Notification>(blob))
            .collect::<Result<Vec<_>, _>>()?;
        notifications.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(notifications)
    }
}

/// Fallback that records offline deliveries in the log.
///
/// Stands in where no email or mobile-push integration is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFallback;

impl FallbackDelivery for TracingFallback {
    async fn deliver(
        &self,
        receiver_user_id: &str,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        info!(
            receiver = receiver_user_id,
            notification_id = %notification.id,
            event = %notification.event_id,
            "receiver offline, notification queued for fallback delivery"
        );
        Ok(())
    }
}
