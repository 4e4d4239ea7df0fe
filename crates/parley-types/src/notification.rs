//! Out-of-band notification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification delivered to a single user.
///
/// `trigger_id` names the entity the event happened on (a post, a comment);
/// `event_id` names what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub date: DateTime<Utc>,
    pub trigger_id: Option<String>,
    pub event_id: String,
    pub content: Option<String>,
    pub read: bool,
}

/// Shorten `content` to at most `max_len` characters, ending with "...".
pub fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    let keep = if max_len > 3 { max_len - 3 } else { max_len };
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}
