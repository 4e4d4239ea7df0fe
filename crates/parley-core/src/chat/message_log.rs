//! Per-conversation append-only message log.
//!
//! Messages live in a sorted set scored by creation time (whole Unix
//! seconds). Every append also publishes the encoded message on the
//! conversation's broadcast channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_types::chat::Message;
use parley_types::codec;
use parley_types::error::ChatError;
use tracing::debug;

use crate::keys;
use crate::store::{KeyValueStore, Subscription};

/// Time-ordered message storage for conversations.
pub struct MessageLog<S> {
    store: Arc<S>,
    max_messages: usize,
}

impl<S> Clone for MessageLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_messages: self.max_messages,
        }
    }
}

impl<S: KeyValueStore> MessageLog<S> {
    /// `max_messages` caps each log; the oldest entries are trimmed on
    /// append. 0 keeps everything.
    pub fn new(store: Arc<S>, max_messages: usize) -> Self {
        Self {
            store,
            max_messages,
        }
    }

    /// Insert a message, enforce the retention cap, then publish it.
    ///
    /// Returns how many live subscriptions received the publish.
    pub async fn append(&self, conversation_id: &str, msg: &Message) -> Result<usize, ChatError> {
        let blob = codec::encode(msg)?;
        let key = keys::conversation_messages(conversation_id);

        self.store.zadd(&key, msg.score(), &blob).await?;

        if self.max_messages > 0 {
            let trimmed = self.store.ztrim(&key, self.max_messages).await?;
            if trimmed > 0 {
                debug!(conversation_id, trimmed, "trimmed conversation log");
            }
        }

        let receivers = self
            .store
            .publish(&keys::conversation_channel(conversation_id), &blob)
            .await?;

        debug!(
            conversation_id,
            message_id = %msg.id,
            kind = %msg.kind(),
            receivers,
            "appended message"
        );
        Ok(receivers)
    }

    /// Messages created at or after `since`, ascending, skipping `offset`
    /// and returning at most `count`.
    pub async fn query(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let blobs = self
            .store
            .zrange_by_score(
                &keys::conversation_messages(conversation_id),
                since.timestamp() as f64,
                f64::INFINITY,
                offset,
                count,
            )
            .await?;

        blobs
            .iter()
            .map(|blob| codec::decode::<Message>(blob).map_err(ChatError::from))
            .collect()
    }

    /// The most recent message, if any.
    pub async fn get_last(&self, conversation_id: &str) -> Result<Option<Message>, ChatError> {
        let blobs = self
            .store
            .zrevrange(&keys::conversation_messages(conversation_id), 0, 0)
            .await?;

        match blobs.first() {
            Some(blob) => Ok(Some(codec::decode(blob)?)),
            None => Ok(None),
        }
    }

    /// Number of retained messages.
    pub async fn len(&self, conversation_id: &str) -> Result<usize, ChatError> {
        Ok(self
            .store
            .zcard(&keys::conversation_messages(conversation_id))
            .await?)
    }

    /// Subscribe to the conversation's broadcast channel.
    ///
    /// Resolves once the subscription is acknowledged.
    pub async fn subscribe(&self, conversation_id: &str) -> Result<Subscription, ChatError> {
        Ok(self
            .store
            .subscribe(&keys::conversation_channel(conversation_id))
            .await?)
    }
}
