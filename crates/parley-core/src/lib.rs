//! Core services for Parley.
//!
//! Everything here is generic over the [`store::KeyValueStore`] port;
//! parley-core never depends on parley-infra.

pub mod chat;
pub mod feed;
pub mod keys;
pub mod lock;
pub mod notification;
pub mod presence;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
