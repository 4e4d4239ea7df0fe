//! CLI command definitions for the `parley` binary.
//!
//! Commands follow a noun-verb pattern (e.g. `parley conversation create`,
//! `parley session renew`).

pub mod conversation;
pub mod demo;
pub mod message;
pub mod notification;
pub mod presence;
pub mod session;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use parley_types::config::StoreBackend;

/// Chat conversations, presence, sessions and notifications over a key-value store.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Store backend, overriding config.toml.
    #[arg(long, global = true, env = "PARLEY_STORE_BACKEND")]
    pub backend: Option<StoreBackend>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage conversations (create, list, show, read, add participants).
    #[command(alias = "conv")]
    Conversation {
        #[command(subcommand)]
        action: conversation::ConversationCommand,
    },

    /// Send messages and page through history.
    #[command(alias = "msg")]
    Message {
        #[command(subcommand)]
        action: message::MessageCommand,
    },

    /// Track which conversation a user is viewing.
    Active {
        #[command(subcommand)]
        action: conversation::ActiveCommand,
    },

    /// Mark users online or offline.
    Presence {
        #[command(subcommand)]
        action: presence::PresenceCommand,
    },

    /// Issue, resolve, rotate and revoke sessions.
    Session {
        #[command(subcommand)]
        action: session::SessionCommand,
    },

    /// Send and list notifications.
    #[command(alias = "notify")]
    Notification {
        #[command(subcommand)]
        action: notification::NotificationCommand,
    },

    /// Store and configuration summary.
    Status,

    /// Run a live subscribe/send round trip in this process.
    Demo {
        /// Messages to send through the live feed.
        #[arg(long, default_value = "3")]
        messages: usize,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// A participant given as `user_id:username`. A bare id is also its username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserArg {
    pub id: String,
    pub name: String,
}

impl std::str::FromStr for UserArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, name) = match s.split_once(':') {
            Some((id, name)) => (id.trim(), name.trim()),
            None => (s.trim(), s.trim()),
        };
        if id.is_empty() {
            return Err(format!("invalid user '{s}': expected user_id[:username]"));
        }
        let name = if name.is_empty() { id } else { name };
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

/// Shorten `text` to at most `max` characters for table cells.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
