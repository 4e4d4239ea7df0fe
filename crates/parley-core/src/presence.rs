//! Online presence tracking.
//!
//! A single set of online user ids. Presence gates live notification push
//! versus fallback delivery.

use std::sync::Arc;

use parley_types::error::StoreError;
use tracing::debug;

use crate::keys;
use crate::store::KeyValueStore;

pub struct PresenceTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for PresenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> PresenceTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Mark a user online. Idempotent.
    pub async fn log(&self, user_id: &str) -> Result<(), StoreError> {
        if self.store.sadd(keys::ONLINE_USERS, user_id).await? {
            debug!(user_id, "user online");
        }
        Ok(())
    }

    /// Mark a user offline. Idempotent.
    pub async fn unlog(&self, user_id: &str) -> Result<(), StoreError> {
        if self.store.srem(keys::ONLINE_USERS, user_id).await? {
            debug!(user_id, "user offline");
        }
        Ok(())
    }

    pub async fn is_online(&self, user_id: &str) -> Result<bool, StoreError> {
        self.store.sismember(keys::ONLINE_USERS, user_id).await
    }

    /// All online user ids, sorted.
    pub async fn online_users(&self) -> Result<Vec<String>, StoreError> {
        let mut users = self.store.smembers(keys::ONLINE_USERS).await?;
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;

    #[tokio::test]
    async fn log_and_unlog_are_idempotent() {
        let presence = PresenceTracker::new(Arc::new(MockStore::default()));

        presence.log("u1").await.unwrap();
        presence.log("u1").await.unwrap();
        assert!(presence.is_online("u1").await.unwrap());
        assert_eq!(presence.online_users().await.unwrap(), vec!["u1".to_string()]);

        presence.unlog("u1").await.unwrap();
        presence.unlog("u1").await.unwrap();
        assert!(!presence.is_online("u1").await.unwrap());
    }
}
