//! Store key layout and lock key naming.

/// Hash of a user's conversation copies: conversation id -> conversation blob.
pub fn user_conversations(user_id: &str) -> String {
    format!("conversations:{user_id}")
}

/// Sorted set of message blobs scored by creation time (Unix seconds).
pub fn conversation_messages(conversation_id: &str) -> String {
    format!("conversations:{conversation_id}:messages")
}

/// Broadcast channel carrying newly appended message blobs.
pub fn conversation_channel(conversation_id: &str) -> String {
    format!("conversation:pubsub:{conversation_id}")
}

/// String pointer to the conversation a user is currently viewing.
pub fn active_conversation(user_id: &str) -> String {
    format!("conversations:active:{user_id}")
}

/// Per-user notification push channel.
pub fn push_channel(user_id: &str) -> String {
    format!("push:user:{user_id}")
}

/// Set of online user ids.
pub const ONLINE_USERS: &str = "user:online";

/// String holding the session user blob, with the session TTL.
pub fn session(sid: &str) -> String {
    format!("session:{sid}")
}

/// Set of session ids issued to a user. Carries no TTL.
pub fn user_sessions(user_id: &str) -> String {
    format!("sessions:user:{user_id}")
}

/// Hash of the latest notification per dedupe key for a receiver.
pub fn user_notifications(user_id: &str) -> String {
    format!("notifications:{user_id}")
}

/// Lock guarding one participant's copy of a conversation.
pub fn conversation_lock(owner_id: &str, conversation_id: &str) -> String {
    format!("conversation:{owner_id}:{conversation_id}")
}

/// Lock serializing appends to one conversation log.
pub fn message_log_lock(conversation_id: &str) -> String {
    format!("messages:{conversation_id}")
}

/// Lock guarding the lookup-then-create of a direct thread between two users.
pub fn direct_conversation_lock(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("direct:{lo}:{hi}")
}

/// Lock serializing renewal of one session.
pub fn session_lock(sid: &str) -> String {
    format!("session:{sid}")
}
