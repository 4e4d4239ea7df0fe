//! Shared domain types for Parley.
//!
//! Conversations, messages, notifications, sessions, the versioned blob codec,
//! configuration, and the error enums shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, base64, thiserror.

pub mod chat;
pub mod codec;
pub mod config;
pub mod error;
pub mod notification;
pub mod session;
