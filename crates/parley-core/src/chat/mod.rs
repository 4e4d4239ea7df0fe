//! Conversations and message history.
//!
//! `ConversationStore` owns the per-participant conversation copies,
//! `MessageLog` the time-ordered message sets, and `ChatService` composes
//! both under the keyed lock.

pub mod conversation_store;
pub mod message_log;
pub mod service;
