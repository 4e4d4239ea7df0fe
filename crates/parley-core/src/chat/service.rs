//! Chat service: conversations, messages, active pointers, unread counts.
//!
//! Composes [`ConversationStore`] and [`MessageLog`] with a [`KeyedLock`].
//! Every read-modify-write of a conversation copy runs under the write lock
//! for `conversation_lock(owner, conversation)`; appends to a log run under
//! `message_log_lock(conversation)`.

use std::sync::Arc;

use parley_types::chat::{Conversation, Message, MessagesPage, Participant};
use parley_types::codec;
use parley_types::config::ChatConfig;
use parley_types::error::ChatError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::conversation_store::ConversationStore;
use crate::chat::message_log::MessageLog;
use crate::feed::Feed;
use crate::keys;
use crate::lock::KeyedLock;
use crate::store::KeyValueStore;

/// Outcome of a send.
///
/// The message is durable and published once a report exists. Unread
/// bookkeeping is best-effort: participants whose count could not be bumped
/// are listed in `failures`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub message_id: String,
    /// Live subscriptions the publish reached.
    pub receivers: usize,
    /// Participants whose unread count was incremented.
    pub unread_incremented: Vec<String>,
    pub failures: Vec<BookkeepingFailure>,
}

impl SendReport {
    /// Whether any unread bookkeeping failed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A participant whose unread bookkeeping failed after a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookkeepingFailure {
    /// None when the conversation's participant list could not be read.
    pub user_id: Option<String>,
    pub reason: String,
}

/// Orchestrates conversations and messages over a shared store.
pub struct ChatService<S> {
    store: Arc<S>,
    conversations: ConversationStore<S>,
    messages: MessageLog<S>,
    locks: Arc<KeyedLock>,
    config: ChatConfig,
}

fn require(value: &str, what: &str) -> Result<(), ChatError> {
    if value.is_empty() {
        return Err(ChatError::InvalidArgument(format!("missing {what}")));
    }
    Ok(())
}

/// Clear `user_id`'s active pointer if it still names `channel`.
async fn clear_active_if<S: KeyValueStore>(store: &S, user_id: &str, channel: &str) {
    let key = keys::active_conversation(user_id);
    let cleared = match store.get(&key).await {
        Ok(Some(active)) if active == channel => store.del(&key).await.map(|_| true),
        Ok(_) => Ok(false),
        Err(e) => Err(e),
    };
    match cleared {
        Ok(true) => debug!(user_id, channel, "listener gone, cleared active conversation"),
        Ok(false) => {}
        Err(e) => warn!(user_id, channel, error = %e, "could not clear active conversation"),
    }
}

impl<S: KeyValueStore> ChatService<S> {
    pub fn new(store: Arc<S>, locks: Arc<KeyedLock>, config: ChatConfig) -> Self {
        let messages = MessageLog::new(Arc::clone(&store), config.max_chat_messages);
        let conversations = ConversationStore::new(Arc::clone(&store), messages.clone());
        Self {
            store,
            conversations,
            messages,
            locks,
            config,
        }
    }

    pub fn conversations(&self) -> &ConversationStore<S> {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageLog<S> {
        &self.messages
    }

    pub fn locks(&self) -> &Arc<KeyedLock> {
        &self.locks
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    // --- Messages ---

    /// Append `msg` to the conversation, publish it, and bump the unread
    /// count of every participant not currently viewing the conversation.
    ///
    /// Fails only if validation, the append, or the publish fails. Unread
    /// bookkeeping failures are logged and reported in the [`SendReport`].
    #[tracing::instrument(
        name = "chat.send_message",
        skip(self, msg),
        fields(message_id = %msg.id, sender = %msg.user_id, kind = %msg.kind())
    )]
    pub async fn send_message(&self, channel: &str, msg: &Message) -> Result<SendReport, ChatError> {
        require(channel, "channel")?;
        require(&msg.user_id, "user id")?;
        require(&msg.sender_username, "username")?;
        msg.payload.validate()?;

        let receivers = {
            let _guard = self.locks.lock(&keys::message_log_lock(channel)).await;
            self.messages.append(channel, msg).await?
        };

        let mut report = SendReport {
            message_id: msg.id.clone(),
            receivers,
            unread_incremented: Vec::new(),
            failures: Vec::new(),
        };

        let participants: Vec<String> = match self.conversations.get(&msg.user_id, channel).await {
            Ok(conv) => conv.participant_ids().map(str::to_string).collect(),
            Err(e) => {
                warn!(channel, error = %e, "could not read participants after send");
                report.failures.push(BookkeepingFailure {
                    user_id: None,
                    reason: e.to_string(),
                });
                return Ok(report);
            }
        };

        for user_id in participants {
            match self.bump_unread_if_inactive(&user_id, channel).await {
                Ok(true) => report.unread_incremented.push(user_id),
                Ok(false) => {}
                Err(e) => {
                    warn!(channel, user_id = %user_id, error = %e, "unread bookkeeping failed");
                    report.failures.push(BookkeepingFailure {
                        user_id: Some(user_id),
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            channel,
            receivers,
            unread = report.unread_incremented.len(),
            failures = report.failures.len(),
            "message sent"
        );
        Ok(report)
    }

    async fn bump_unread_if_inactive(&self, user_id: &str, channel: &str) -> Result<bool, ChatError> {
        if self.active_conversation(user_id).await?.as_deref() == Some(channel) {
            return Ok(false);
        }
        self.increment_unread(user_id, channel).await?;
        Ok(true)
    }

    /// Stream messages published to `channel` from now on.
    ///
    /// Resolves only after the subscription is acknowledged, so every
    /// message sent after this returns is delivered. The feed ends when
    /// `token` is cancelled or the feed is closed.
    pub async fn subscribe(
        &self,
        token: &CancellationToken,
        channel: &str,
    ) -> Result<Feed<Message>, ChatError> {
        require(channel, "channel")?;
        let subscription = self.messages.subscribe(channel).await?;
        debug!(channel, "subscribed to conversation");
        Ok(Feed::spawn(
            subscription,
            token,
            self.config.feed_buffer,
            codec::decode::<Message>,
        ))
    }

    /// Follow `channel` as `user_id`: mark it read, make it the user's
    /// active conversation, and stream new messages.
    ///
    /// The active pointer lives as long as the feed. When the feed ends
    /// (cancel, close, drop or source end) the pointer is cleared, unless
    /// the user has since moved it to another conversation. The feed yields
    /// `None` only after the pointer has been cleared.
    pub async fn listen(
        &self,
        token: &CancellationToken,
        user_id: &str,
        channel: &str,
    ) -> Result<Feed<Message>, ChatError>
    where
        S: 'static,
    {
        require(user_id, "user id")?;
        require(channel, "channel")?;

        self.read_conversation_messages(user_id, channel).await?;
        self.set_active_conversation(user_id, channel).await?;

        let subscription = match self.messages.subscribe(channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                clear_active_if(self.store.as_ref(), user_id, channel).await;
                return Err(e);
            }
        };

        let store = Arc::clone(&self.store);
        let (owner, conversation) = (user_id.to_string(), channel.to_string());
        let on_end = async move {
            clear_active_if(store.as_ref(), &owner, &conversation).await;
        };

        info!(user_id, channel, "listening to conversation");
        Ok(Feed::spawn_with(
            subscription,
            token,
            self.config.feed_buffer,
            codec::decode::<Message>,
            on_end,
        ))
    }

    /// One page of history visible to `user_id`.
    ///
    /// Only messages created at or after the user's join time are visible.
    /// Pages are `messages_limit` long; `offset` counts visible messages.
    pub async fn get_messages(
        &self,
        user_id: &str,
        channel: &str,
        offset: usize,
    ) -> Result<MessagesPage, ChatError> {
        require(user_id, "user id")?;
        require(channel, "channel")?;

        let conv = {
            let _guard = self
                .locks
                .rlock(&keys::conversation_lock(user_id, channel))
                .await;
            self.conversations.get(user_id, channel).await?
        };
        let joined_at = conv
            .participant(user_id)
            .map(|p| p.joined_at)
            .ok_or_else(|| {
                ChatError::NotFound(format!("participant {user_id} in conversation {channel}"))
            })?;

        let limit = self.config.messages_limit;
        let fetched = self
            .messages
            .query(channel, joined_at, offset, limit + 1)
            .await?;
        Ok(MessagesPage::from_overfetch(fetched, limit))
    }

    // --- Active conversation ---

    /// Mark `conversation_id` as the one `user_id` is viewing.
    pub async fn set_active_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatError> {
        require(user_id, "user id")?;
        require(conversation_id, "channel")?;
        self.store
            .set(&keys::active_conversation(user_id), conversation_id, None)
            .await?;
        debug!(user_id, conversation_id, "set active conversation");
        Ok(())
    }

    pub async fn delete_active_conversation(&self, user_id: &str) -> Result<(), ChatError> {
        require(user_id, "user id")?;
        self.store.del(&keys::active_conversation(user_id)).await?;
        debug!(user_id, "cleared active conversation");
        Ok(())
    }

    pub async fn active_conversation(&self, user_id: &str) -> Result<Option<String>, ChatError> {
        Ok(self.store.get(&keys::active_conversation(user_id)).await?)
    }

    // --- Conversations ---

    /// Persist a new conversation under every participant.
    pub async fn create_conversation(&self, conv: &Conversation) -> Result<(), ChatError> {
        require(&conv.id, "conversation id")?;
        if conv.participants.is_empty() {
            return Err(ChatError::InvalidArgument(
                "a conversation needs at least one participant".to_string(),
            ));
        }
        self.conversations.create(conv).await
    }

    /// `user_id`'s copy of a conversation with its last message attached.
    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        let _guard = self
            .locks
            .rlock(&keys::conversation_lock(user_id, conversation_id))
            .await;
        self.conversations
            .get_with_last_message(user_id, conversation_id)
            .await
    }

    /// All of `user_id`'s conversations, most recently active first.
    pub async fn get_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        require(user_id, "user id")?;
        self.conversations.list(user_id).await
    }

    /// Conversations between exactly `user_id` and `other_user_id`.
    pub async fn get_conversations_with_user(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Vec<Conversation>, ChatError> {
        require(user_id, "user id")?;
        require(other_user_id, "other user id")?;
        self.conversations
            .list_with_participant(user_id, other_user_id)
            .await
    }

    /// The most recently active direct conversation between two users.
    pub async fn find_direct_conversation(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        Ok(self
            .get_conversations_with_user(user_id, other_user_id)
            .await?
            .into_iter()
            .next())
    }

    /// Return the direct conversation between two users, creating it if
    /// none exists. The flag is true when a conversation was created.
    pub async fn open_direct_conversation(
        &self,
        user: (&str, &str),
        other: (&str, &str),
    ) -> Result<(Conversation, bool), ChatError> {
        let (user_id, username) = user;
        let (other_id, other_name) = other;

        let _guard = self
            .locks
            .lock(&keys::direct_conversation_lock(user_id, other_id))
            .await;

        if let Some(existing) = self.find_direct_conversation(user_id, other_id).await? {
            return Ok((existing, false));
        }

        let conv = Conversation::new([(user_id, username), (other_id, other_name)])?;
        self.conversations.create(&conv).await?;
        Ok((conv, true))
    }

    /// Add a participant to an existing conversation, joining now.
    ///
    /// Every existing copy is updated with the new participant and the new
    /// participant receives a fresh copy with no unread messages.
    pub async fn add_participant(
        &self,
        owner_id: &str,
        conversation_id: &str,
        participant: Participant,
    ) -> Result<Conversation, ChatError> {
        require(&participant.user_id, "participant user id")?;

        let base = self.conversations.get(owner_id, conversation_id).await?;
        if base.is_participant(&participant.user_id) {
            return Ok(base);
        }

        let new_id = participant.user_id.clone();
        for existing in base.participant_ids() {
            let guard = self
                .locks
                .lock(&keys::conversation_lock(existing, conversation_id))
                .await;
            let mut copy = self.conversations.get(existing, conversation_id).await?;
            copy.participants
                .insert(new_id.clone(), participant.clone());
            self.conversations.update(&guard, existing, &copy).await?;
        }

        let guard = self
            .locks
            .lock(&keys::conversation_lock(&new_id, conversation_id))
            .await;
        let mut fresh = base;
        fresh.participants.insert(new_id.clone(), participant);
        fresh.unread_messages_count = 0;
        self.conversations.update(&guard, &new_id, &fresh).await?;

        info!(conversation_id, user_id = %new_id, "participant joined");
        Ok(fresh)
    }

    // --- Unread bookkeeping ---

    /// Reset `user_id`'s unread count for the conversation to zero.
    pub async fn read_conversation_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        let guard = self
            .locks
            .lock(&keys::conversation_lock(user_id, conversation_id))
            .await;
        let mut conv = self.conversations.get(user_id, conversation_id).await?;
        conv.unread_messages_count = 0;
        self.conversations.update(&guard, user_id, &conv).await?;
        guard.unlock();

        debug!(user_id, conversation_id, "conversation marked read");
        Ok(conv)
    }

    /// Participants of the conversation whose active pointer is not it.
    ///
    /// Reads the participant list from `sender_id`'s copy. The sender is
    /// included when they are not viewing the conversation.
    pub async fn inactive_participants(
        &self,
        sender_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<String>, ChatError> {
        let conv = self.conversations.get(sender_id, conversation_id).await?;
        let mut inactive = Vec::new();
        for user_id in conv.participant_ids() {
            if self.active_conversation(user_id).await?.as_deref() != Some(conversation_id) {
                inactive.push(user_id.to_string());
            }
        }
        Ok(inactive)
    }

    /// Add one to `user_id`'s unread count. Returns the new count.
    pub async fn increment_unread(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<u64, ChatError> {
        let guard = self
            .locks
            .lock(&keys::conversation_lock(user_id, conversation_id))
            .await;
        let mut conv = self.conversations.get(user_id, conversation_id).await?;
        conv.unread_messages_count += 1;
        self.conversations.update(&guard, user_id, &conv).await?;
        Ok(conv.unread_messages_count)
    }
}
