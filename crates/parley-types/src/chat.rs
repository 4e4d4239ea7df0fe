//! Conversation, participant, and message types for Parley.
//!
//! A conversation is persisted once per participant, so every participant owns
//! an independent copy (with its own unread counter). Messages are append-only
//! and carry exactly one payload, chosen when the message is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;

/// A member of a conversation.
///
/// `joined_at` is the lower bound of the history this participant may read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            joined_at,
        }
    }
}

/// A multi-participant chat thread.
///
/// `unread_messages_count` is per copy: each participant's stored record
/// tracks that participant's own unread messages. `last_message` is never
/// persisted with the record; it is attached when the record is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: BTreeMap<String, Participant>,
    pub created_at: DateTime<Utc>,
    pub unread_messages_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

impl Conversation {
    /// Create a conversation whose participants all join now.
    ///
    /// Duplicate user ids collapse into one participant (first username wins).
    pub fn new<I, U, N>(participants: I) -> Result<Self, ChatError>
    where
        I: IntoIterator<Item = (U, N)>,
        U: Into<String>,
        N: Into<String>,
    {
        let now = Utc::now();
        Self::with_participants(
            participants
                .into_iter()
                .map(|(user_id, username)| Participant::new(user_id, username, now)),
        )
    }

    /// Create a conversation from fully specified participants.
    pub fn with_participants<I>(participants: I) -> Result<Self, ChatError>
    where
        I: IntoIterator<Item = Participant>,
    {
        let mut map = BTreeMap::new();
        for participant in participants {
            if participant.user_id.is_empty() {
                return Err(ChatError::InvalidArgument(
                    "participant user id is empty".to_string(),
                ));
            }
            map.entry(participant.user_id.clone()).or_insert(participant);
        }

        if map.is_empty() {
            return Err(ChatError::InvalidArgument(
                "a conversation needs at least one participant".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::now_v7().to_string(),
            participants: map,
            created_at: Utc::now(),
            unread_messages_count: 0,
            last_message: None,
        })
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.contains_key(user_id)
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.keys().map(String::as_str)
    }

    /// Whether the participant set equals `user_ids`, ignoring order and duplicates.
    pub fn has_exact_participants(&self, user_ids: &[&str]) -> bool {
        let wanted: BTreeSet<&str> = user_ids.iter().copied().collect();
        wanted.len() == self.participants.len()
            && wanted.iter().all(|id| self.participants.contains_key(*id))
    }

    /// Time of the most recent activity: the last message, else creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }
}

/// Discriminant of a [`MessagePayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Award,
    Donation,
    Audio,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Award => write!(f, "award"),
            MessageKind::Donation => write!(f, "donation"),
            MessageKind::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "award" => Ok(MessageKind::Award),
            "donation" => Ok(MessageKind::Donation),
            "audio" => Ok(MessageKind::Audio),
            other => Err(format!("invalid message kind: '{other}'")),
        }
    }
}

/// The content of a message. Exactly one kind per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePayload {
    Text {
        content: String,
    },
    Award {
        award_id: String,
    },
    Donation {
        amount: i64,
    },
    Audio {
        #[serde(with = "crate::codec::base64_bytes")]
        bytes: Vec<u8>,
    },
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Text { .. } => MessageKind::Text,
            MessagePayload::Award { .. } => MessageKind::Award,
            MessagePayload::Donation { .. } => MessageKind::Donation,
            MessagePayload::Audio { .. } => MessageKind::Audio,
        }
    }

    /// Reject payloads that carry no meaningful content.
    pub fn validate(&self) -> Result<(), ChatError> {
        let problem = match self {
            MessagePayload::Text { content } if content.is_empty() => "missing content",
            MessagePayload::Award { award_id } if award_id.is_empty() => "missing award id",
            MessagePayload::Donation { amount } if *amount <= 0 => {
                "donation amount must be positive"
            }
            MessagePayload::Audio { bytes } if bytes.is_empty() => "missing audio",
            _ => return Ok(()),
        };
        Err(ChatError::InvalidArgument(problem.to_string()))
    }
}

/// Human-readable rendering: text as-is, other kinds as a bracketed summary.
impl fmt::Display for MessagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePayload::Text { content } => f.write_str(content),
            MessagePayload::Award { award_id } => write!(f, "[award {award_id}]"),
            MessagePayload::Donation { amount } => write!(f, "[donation {amount}]"),
            MessagePayload::Audio { bytes } => write!(f, "[audio, {} bytes]", bytes.len()),
        }
    }
}

/// A single chat message.
///
/// Ordering within a conversation is by `created_at` (whole seconds are the
/// store score), not by arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub sender_username: String,
    pub created_at: DateTime<Utc>,
    pub payload: MessagePayload,
}

impl Message {
    /// Build a message stamped now with a fresh UUIDv7 id.
    pub fn new(
        user_id: impl Into<String>,
        sender_username: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            sender_username: sender_username.into(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn text(
        user_id: impl Into<String>,
        sender_username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            sender_username,
            MessagePayload::Text {
                content: content.into(),
            },
        )
    }

    pub fn award(
        user_id: impl Into<String>,
        sender_username: impl Into<String>,
        award_id: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            sender_username,
            MessagePayload::Award {
                award_id: award_id.into(),
            },
        )
    }

    pub fn donation(
        user_id: impl Into<String>,
        sender_username: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self::new(user_id, sender_username, MessagePayload::Donation { amount })
    }

    pub fn audio(
        user_id: impl Into<String>,
        sender_username: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::new(user_id, sender_username, MessagePayload::Audio { bytes })
    }

    /// Override the creation timestamp (backfills, tests).
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Store score: whole Unix seconds of `created_at`.
    pub fn score(&self) -> f64 {
        self.created_at.timestamp() as f64
    }
}

/// One page of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

impl MessagesPage {
    /// Build a page from a query that fetched up to `limit + 1` items.
    ///
    /// The extra item only signals that another page exists; it is dropped.
    pub fn from_overfetch(mut messages: Vec<Message>, limit: usize) -> Self {
        let has_more = messages.len() > limit;
        messages.truncate(limit);
        Self { messages, has_more }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_message_kind_roundtrip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Award,
            MessageKind::Donation,
            MessageKind::Audio,
        ] {
            let parsed: MessageKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
        assert!("video".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let msg = Message::award("u1", "alice", "gold");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"award\""));
        assert!(json.contains("\"award_id\":\"gold\""));
    }

    #[test]
    fn test_payload_validation() {
        assert!(Message::text("u1", "alice", "hi").payload.validate().is_ok());
        assert!(Message::text("u1", "alice", "").payload.validate().is_err());
        assert!(Message::award("u1", "alice", "").payload.validate().is_err());
        assert!(Message::donation("u1", "alice", 0).payload.validate().is_err());
        assert!(Message::donation("u1", "alice", -5).payload.validate().is_err());
        assert!(Message::audio("u1", "alice", vec![]).payload.validate().is_err());
        assert!(Message::audio("u1", "alice", vec![1, 2]).payload.validate().is_ok());
    }

    #[test]
    fn test_payload_display() {
        assert_eq!(MessagePayload::Text { content: "hi".into() }.to_string(), "hi");
        assert_eq!(MessagePayload::Donation { amount: 5 }.to_string(), "[donation 5]");
        assert_eq!(
            MessagePayload::Audio { bytes: vec![0; 3] }.to_string(),
            "[audio, 3 bytes]"
        );
    }

    #[test]
    fn test_message_score_is_whole_seconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        let msg = Message::text("u1", "alice", "hi").at(at);
        assert_eq!(msg.score(), 1_700_000_000.0);
    }

    #[test]
    fn test_conversation_new_dedupes_participants() {
        let conv = Conversation::new([("a", "alice"), ("b", "bob"), ("a", "again")]).unwrap();
        assert_eq!(conv.participants.len(), 2);
        assert_eq!(conv.participant("a").unwrap().username, "alice");
        assert_eq!(conv.unread_messages_count, 0);
        assert!(conv.last_message.is_none());
    }

    #[test]
    fn test_conversation_requires_participants() {
        let empty: Vec<(String, String)> = Vec::new();
        assert!(matches!(
            Conversation::new(empty),
            Err(ChatError::InvalidArgument(_))
        ));
        assert!(Conversation::new([("", "ghost")]).is_err());
    }

    #[test]
    fn test_has_exact_participants_is_order_independent() {
        let conv = Conversation::new([("a", "alice"), ("b", "bob")]).unwrap();
        assert!(conv.has_exact_participants(&["b", "a"]));
        assert!(conv.has_exact_participants(&["a", "b", "a"]));
        assert!(!conv.has_exact_participants(&["a"]));
        assert!(!conv.has_exact_participants(&["a", "b", "c"]));
    }

    #[test]
    fn test_last_activity_prefers_last_message() {
        let mut conv = Conversation::new([("a", "alice")]).unwrap();
        assert_eq!(conv.last_activity(), conv.created_at);

        let later = conv.created_at + Duration::seconds(30);
        conv.last_message = Some(Message::text("a", "alice", "hey").at(later));
        assert_eq!(conv.last_activity(), later);
    }

    #[test]
    fn test_page_from_overfetch() {
        let msgs: Vec<Message> = (0..11)
            .map(|i| Message::text("u", "n", format!("m{i}")))
            .collect();

        let page = MessagesPage::from_overfetch(msgs.clone(), 10);
        assert_eq!(page.messages.len(), 10);
        assert!(page.has_more);

        let page = MessagesPage::from_overfetch(msgs[..10].to_vec(), 10);
        assert_eq!(page.messages.len(), 10);
        assert!(!page.has_more);
    }
}
