//! Configuration types for Parley.
//!
//! `ParleyConfig` mirrors `config.toml`. Every section and field has a
//! default, so an empty file (or no file) yields a working configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conversation and message-log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages per history page.
    #[serde(default = "default_messages_limit")]
    pub messages_limit: usize,

    /// Retention cap per conversation log, enforced on every append. 0 disables it.
    #[serde(default = "default_max_chat_messages")]
    pub max_chat_messages: usize,

    /// Queue depth between a subscription task and its consumer.
    #[serde(default = "default_feed_buffer")]
    pub feed_buffer: usize,
}

fn default_messages_limit() -> usize {
    10
}

fn default_max_chat_messages() -> usize {
    1000
}

fn default_feed_buffer() -> usize {
    64
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            messages_limit: default_messages_limit(),
            max_chat_messages: default_max_chat_messages(),
            feed_buffer: default_feed_buffer(),
        }
    }
}

/// Session lifetime and rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,

    /// Sessions with this much TTL left (or less) are rotated on use.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,
}

fn default_lifetime_secs() -> u64 {
    24 * 60 * 60
}

fn default_refresh_threshold_secs() -> u64 {
    30
}

impl SessionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_lifetime_secs(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
        }
    }
}

/// Keyed lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_shards")]
    pub shards: usize,
}

fn default_shards() -> usize {
    64
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
        }
    }
}

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("invalid store backend: '{other}'")),
        }
    }
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite
    }
}

/// Store backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite URL. Defaults to `{data_dir}/parley.db` when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Per-channel buffer of the in-process pub/sub hub.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_content_max_len")]
    pub content_max_len: usize,
}

fn default_content_max_len() -> usize {
    64
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            content_max_len: default_content_max_len(),
        }
    }
}

/// Tracing output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            otel: false,
        }
    }
}
