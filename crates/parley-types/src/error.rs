use thiserror::Error;

/// Errors surfaced by a key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("key '{0}' holds a value of the wrong type")]
    WrongType(String),

    #[error("subscription to '{0}' is closed")]
    Closed(String),
}

/// Errors from encoding or decoding a stored blob.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed blob: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported blob version {0}")]
    UnsupportedVersion(u32),

    #[error("expected a '{expected}' blob, got '{actual}'")]
    KindMismatch { expected: String, actual: String },
}

/// Errors related to conversations and messages.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors related to session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors related to notification delivery.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("notification repository error: {0}")]
    Repository(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::WrongType("user:online".to_string());
        assert_eq!(
            err.to_string(),
            "key 'user:online' holds a value of the wrong type"
        );
    }

    #[test]
    fn test_chat_error_wraps_store_error_transparently() {
        let err: ChatError = StoreError::Unavailable("connection reset".to_string()).into();
        assert_eq!(err.to_string(), "store unavailable: connection reset");
    }

    #[test]
    fn test_codec_error_kind_mismatch_display() {
        let err = CodecError::KindMismatch {
            expected: "message".to_string(),
            actual: "conversation".to_string(),
        };
        assert!(err.to_string().contains("message"));
        assert!(err.to_string().contains("conversation"));
    }

    #[test]
    fn test_session_error_from_codec() {
        let err: SessionError = CodecError::UnsupportedVersion(9).into();
        assert!(matches!(err, SessionError::Encoding(CodecError::UnsupportedVersion(9))));
    }
}
