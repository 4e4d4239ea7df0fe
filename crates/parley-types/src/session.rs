//! Session types.
//!
//! A session id maps to exactly one user. Sessions expire through the store's
//! TTL and are rotated (new id, old id invalidated) as they near expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The user a session id resolves to. This is the stored session value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A live session as seen from outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub sid: String,
    pub user_id: String,
    /// `None` when the backing entry carries no expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of checking a session for renewal.
///
/// When `renewed` is true, `sid` is a new id and the caller must replace any
/// externally held reference (cookie, header) with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refreshed {
    pub sid: String,
    pub user: SessionUser,
    pub renewed: bool,
}
