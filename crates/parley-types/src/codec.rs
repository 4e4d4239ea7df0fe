//! Versioned blob encoding for values kept in the key-value store.
//!
//! Every stored or published value is a JSON envelope:
//!
//! ```text
//! {"v":1,"kind":"message","body":{...}}
//! ```
//!
//! The version marker and kind tag make blobs decodable by any implementation
//! that reads JSON, and let a reader reject blobs it does not understand
//! instead of misinterpreting them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chat::{Conversation, Message};
use crate::error::CodecError;
use crate::notification::Notification;
use crate::session::SessionUser;

/// Current envelope version.
pub const BLOB_VERSION: u32 = 1;

/// A value that can be stored as a versioned blob.
pub trait Blob: Serialize + DeserializeOwned {
    /// Kind tag written into the envelope.
    const KIND: &'static str;
}

impl Blob for Conversation {
    const KIND: &'static str = "conversation";
}

impl Blob for Message {
    const KIND: &'static str = "message";
}

impl Blob for Notification {
    const KIND: &'static str = "notification";
}

impl Blob for SessionUser {
    const KIND: &'static str = "session_user";
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u32,
    kind: &'a str,
    body: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    v: u32,
    kind: String,
    body: serde_json::Value,
}

/// Encode a value into its envelope string.
pub fn encode<T: Blob>(value: &T) -> Result<String, CodecError> {
    let envelope = EnvelopeRef {
        v: BLOB_VERSION,
        kind: T::KIND,
        body: value,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode an envelope string, checking version and kind.
pub fn decode<T: Blob>(blob: &str) -> Result<T, CodecError> {
    let envelope: Envelope = serde_json::from_str(blob)?;
    if envelope.v != BLOB_VERSION {
        return Err(CodecError::UnsupportedVersion(envelope.v));
    }
    if envelope.kind != T::KIND {
        return Err(CodecError::KindMismatch {
            expected: T::KIND.to_string(),
            actual: envelope.kind,
        });
    }
    Ok(serde_json::from_value(envelope.body)?)
}

/// Serde adapter writing binary payloads as standard base64 strings.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Participant, MessagePayload};
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_message_roundtrip_all_kinds() {
        let messages = [
            Message::text("u1", "alice", "hello"),
            Message::award("u1", "alice", "award_gold"),
            Message::donation("u1", "alice", 10),
            Message::audio("u1", "alice", vec![0, 159, 146, 150, 255]),
        ];
        for msg in messages {
            let blob = encode(&msg).unwrap();
            let decoded: Message = decode(&blob).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_conversation_roundtrip_with_last_message() {
        let mut conv = Conversation::with_participants([
            Participant::new("a", "alice", at(1_000)),
            Participant::new("b", "bob", at(1_005)),
        ])
        .unwrap();
        conv.unread_messages_count = 3;
        conv.last_message = Some(Message::text("a", "alice", "hi").at(at(1_010)));

        let decoded: Conversation = decode(&encode(&conv).unwrap()).unwrap();
        assert_eq!(decoded, conv);
    }

    #[test]
    fn test_notification_roundtrip() {
        let n = Notification {
            id: "n1".to_string(),
            date: at(2_000),
            trigger_id: Some("post_1".to_string()),
            event_id: "like_post".to_string(),
            content: None,
            read: false,
        };
        let decoded: Notification = decode(&encode(&n).unwrap()).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn test_envelope_shape() {
        let blob = encode(&SessionUser::new("user_1")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["kind"], "session_user");
        assert_eq!(value["body"]["id"], "user_1");
    }

    #[test]
    fn test_audio_is_base64_on_the_wire() {
        let msg = Message::audio("u1", "alice", b"abc".to_vec());
        let blob = encode(&msg).unwrap();
        assert!(blob.contains("\"bytes\":\"YWJj\""));
        assert!(matches!(msg.payload, MessagePayload::Audio { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let blob = r#"{"v":2,"kind":"session_user","body":{"id":"x"}}"#;
        let err = decode::<SessionUser>(blob).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_decode_rejects_kind_mismatch() {
        let blob = encode(&SessionUser::new("x")).unwrap();
        let err = decode::<Message>(&blob).unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode::<Message>("not json").unwrap_err(),
            CodecError::Json(_)
        ));
        let bad_audio = r#"{"v":1,"kind":"message","body":{"id":"m","user_id":"u","sender_username":"n","created_at":"2024-01-01T00:00:00Z","payload":{"type":"audio","bytes":"***"}}}"#;
        assert!(decode::<Message>(bad_audio).is_err());
    }
}
