//! SQLite store backend.
//!
//! Durable strings, hashes, sorted sets, and sets in one database file, with
//! pub/sub served by an in-process [`PubSubHub`](crate::pubsub::PubSubHub).

pub mod pool;
pub mod store;
