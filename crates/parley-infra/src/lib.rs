//! Infrastructure layer for Parley.
//!
//! Implements the `KeyValueStore` port from `parley-core` (in-memory and
//! SQLite backends sharing an in-process pub/sub hub), the key-value backed
//! notification repository, and configuration loading.

pub mod any;
pub mod config;
pub mod memory;
pub mod notification;
pub mod pubsub;
pub mod sqlite;
