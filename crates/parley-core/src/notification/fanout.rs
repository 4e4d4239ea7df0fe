//! Per-user notification push channels.

use std::sync::Arc;

use parley_types::codec;
use parley_types::error::NotificationError;
use parley_types::notification::Notification;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::feed::Feed;
use crate::keys;
use crate::store::KeyValueStore;

pub struct NotificationFanout<S> {
    store: Arc<S>,
    buffer: usize,
}

impl<S> Clone for NotificationFanout<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            buffer: self.buffer,
        }
    }
}

impl<S: KeyValueStore> NotificationFanout<S> {
    /// `buffer` is the queue depth of each feed returned by
    /// [`subscribe`](Self::subscribe).
    pub fn new(store: Arc<S>, buffer: usize) -> Self {
        Self { store, buffer }
    }

    /// Publish a notification on the user's push channel.
    ///
    /// Returns how many live feeds received it; 0 is not an error.
    pub async fn push(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<usize, NotificationError> {
        let blob = codec::encode(notification)?;
        let receivers = self
            .store
            .publish(&keys::push_channel(user_id), &blob)
            .await?;
        debug!(user_id, notification_id = %notification.id, receivers, "pushed notification");
        Ok(receivers)
    }

    /// Stream notifications pushed to `user_id` from now on.
    ///
    /// Resolves after the subscription is acknowledged. Ends when `token` is
    /// cancelled.
    pub async fn subscribe(
        &self,
        token: &CancellationToken,
        user_id: &str,
    ) -> Result<Feed<Notification>, NotificationError> {
        let subscription = self.store.subscribe(&keys::push_channel(user_id)).await?;
        Ok(Feed::spawn(
            subscription,
            token,
            self.buffer,
            codec::decode::<Notification>,
        ))
    }
}
