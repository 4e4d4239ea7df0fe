//! Per-participant conversation records.
//!
//! Each participant owns a copy of every conversation they are in, stored in
//! their `conversations:{user_id}` hash. Copies differ only in their unread
//! count. Stored copies never embed the last message; it is attached from the
//! message log on read.
//!
//! Listing and participant lookups decode every copy a user owns, so they are
//! linear in the number of conversations per user.

use std::sync::Arc;

use parley_types::chat::Conversation;
use parley_types::codec;
use parley_types::error::ChatError;
use tracing::{debug, info};

use crate::chat::message_log::MessageLog;
use crate::keys;
use crate::lock::KeyedWriteGuard;
use crate::store::KeyValueStore;

/// Reads and writes the per-participant copies of conversations.
pub struct ConversationStore<S> {
    store: Arc<S>,
    log: MessageLog<S>,
}

impl<S: KeyValueStore> ConversationStore<S> {
    pub fn new(store: Arc<S>, log: MessageLog<S>) -> Self {
        Self { store, log }
    }

    /// Write one copy of `conv` under every participant.
    ///
    /// Not transactional: a store failure part-way leaves earlier copies in
    /// place.
    pub async fn create(&self, conv: &Conversation) -> Result<(), ChatError> {
        let blob = Self::encode_stored(conv)?;
        for owner in conv.participant_ids() {
            self.store
                .hset(&keys::user_conversations(owner), &conv.id, &blob)
                .await?;
        }
        info!(
            conversation_id = %conv.id,
            participants = conv.participants.len(),
            "created conversation"
        );
        Ok(())
    }

    /// The stored copy owned by `owner`, without a last message.
    pub async fn get(&self, owner: &str, conversation_id: &str) -> Result<Conversation, ChatError> {
        let blob = self
            .store
            .hget(&keys::user_conversations(owner), conversation_id)
            .await?
            .ok_or_else(|| {
                ChatError::NotFound(format!(
                    "conversation {conversation_id} for user {owner}"
                ))
            })?;
        Ok(codec::decode(&blob)?)
    }

    /// The copy owned by `owner` with its most recent message attached.
    pub async fn get_with_last_message(
        &self,
        owner: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        let mut conv = self.get(owner, conversation_id).await?;
        conv.last_message = self.log.get_last(conversation_id).await?;
        Ok(conv)
    }

    /// Every conversation `owner` is in, newest activity first.
    pub async fn list(&self, owner: &str) -> Result<Vec<Conversation>, ChatError> {
        let all = self.decode_all(owner).await?;
        self.with_last_messages(all).await
    }

    /// Conversations whose participant set is exactly {owner, other}.
    pub async fn list_with_participant(
        &self,
        owner: &str,
        other: &str,
    ) -> Result<Vec<Conversation>, ChatError> {
        let matching = self
            .decode_all(owner)
            .await?
            .into_iter()
            .filter(|conv| conv.has_exact_participants(&[owner, other]))
            .collect();
        self.with_last_messages(matching).await
    }

    /// Overwrite `owner`'s copy.
    ///
    /// The caller must hold the write lock for
    /// [`keys::conversation_lock`]`(owner, conv.id)`; the guard parameter
    /// makes the requirement visible at every call site.
    pub async fn update(
        &self,
        guard: &KeyedWriteGuard,
        owner: &str,
        conv: &Conversation,
    ) -> Result<(), ChatError> {
        debug_assert_eq!(guard.key(), keys::conversation_lock(owner, &conv.id));

        let blob = Self::encode_stored(conv)?;
        self.store
            .hset(&keys::user_conversations(owner), &conv.id, &blob)
            .await?;
        debug!(
            owner,
            conversation_id = %conv.id,
            unread = conv.unread_messages_count,
            "updated conversation copy"
        );
        Ok(())
    }

    fn encode_stored(conv: &Conversation) -> Result<String, ChatError> {
        if conv.last_message.is_some() {
            let mut stored = conv.clone();
            stored.last_message = None;
            Ok(codec::encode(&stored)?)
        } else {
            Ok(codec::encode(conv)?)
        }
    }

    async fn decode_all(&self, owner: &str) -> Result<Vec<Conversation>, ChatError> {
        let blobs = self.store.hgetall(&keys::user_conversations(owner)).await?;
        blobs
            .values()
            .map(|blob| codec::decode::<Conversation>(blob).map_err(ChatError::from))
            .collect()
    }

    async fn with_last_messages(
        &self,
        mut convs: Vec<Conversation>,
    ) -> Result<Vec<Conversation>, ChatError> {
        for conv in &mut convs {
            conv.last_message = self.log.get_last(&conv.id).await?;
        }
        convs.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(convs)
    }
}
