//! Session lifecycle: issue, resolve, rotate, and prune session ids.
//!
//! `session:{sid}` holds the encoded [`SessionUser`] with the session TTL.
//! `sessions:user:{user_id}` indexes every sid issued to a user and carries
//! no TTL, so expired ids linger there until [`SessionManager::sync`] prunes
//! them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_types::codec;
use parley_types::config::SessionConfig;
use parley_types::error::SessionError;
use parley_types::session::{Refreshed, Session, SessionUser};
use tracing::{debug, info};
use uuid::Uuid;

use crate::keys;
use crate::lock::KeyedLock;
use crate::store::KeyValueStore;

pub struct SessionManager<S> {
    store: Arc<S>,
    locks: Arc<KeyedLock>,
    config: SessionConfig,
}

impl<S: KeyValueStore> SessionManager<S> {
    pub fn new(store: Arc<S>, locks: Arc<KeyedLock>, config: SessionConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a new session id for `user`, valid for `ttl`.
    pub async fn set_new(&self, user: &SessionUser, ttl: Duration) -> Result<String, SessionError> {
        if user.id.is_empty() {
            return Err(SessionError::InvalidArgument("missing user id".to_string()));
        }

        let sid = Uuid::new_v4().simple().to_string();
        let blob = codec::encode(user)?;

        self.store
            .sadd(&keys::user_sessions(&user.id), &sid)
            .await?;
        self.store
            .set(&keys::session(&sid), &blob, Some(ttl))
            .await?;

        info!(user_id = %user.id, ttl_secs = ttl.as_secs(), "session created");
        Ok(sid)
    }

    /// Issue a session with the configured lifetime.
    pub async fn create(&self, user: &SessionUser) -> Result<String, SessionError> {
        self.set_new(user, self.config.lifetime()).await
    }

    /// Resolve a live session id to its user.
    pub async fn get_user_by_sid(&self, sid: &str) -> Result<SessionUser, SessionError> {
        let blob = self
            .store
            .get(&keys::session(sid))
            .await?
            .ok_or(SessionError::NotFound)?;
        Ok(codec::decode(&blob)?)
    }

    pub async fn has_session(&self, sid: &str) -> Result<bool, SessionError> {
        Ok(self.store.get(&keys::session(sid)).await?.is_some())
    }

    /// Remaining lifetime. None when the session is gone.
    pub async fn remaining_ttl(&self, sid: &str) -> Result<Option<Duration>, SessionError> {
        Ok(self.store.ttl(&keys::session(sid)).await?)
    }

    /// Resolve a session with its expiry time.
    pub async fn describe(&self, sid: &str) -> Result<Session, SessionError> {
        let user = self.get_user_by_sid(sid).await?;
        let expires_at = self
            .remaining_ttl(sid)
            .await?
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        Ok(Session {
            sid: sid.to_string(),
            user_id: user.id,
            expires_at,
        })
    }

    /// Invalidate a session, then prune the owner's index.
    ///
    /// Takes the same write lock as [`renew_session`](Self::renew_session),
    /// so a logout never returns while a rotation of `sid` is in flight.
    pub async fn delete(&self, sid: &str) -> Result<(), SessionError> {
        let _guard = self.locks.lock(&keys::session_lock(sid)).await;

        let user = self.get_user_by_sid(sid).await?;
        self.store.del(&keys::session(sid)).await?;
        let pruned = self.sync(&user.id).await?;
        info!(user_id = %user.id, pruned, "session deleted");
        Ok(())
    }

    /// Drop sids from the user's index whose session no longer exists.
    /// Returns how many were removed.
    pub async fn sync(&self, user_id: &str) -> Result<usize, SessionError> {
        let index = keys::user_sessions(user_id);
        let mut removed = 0;
        for sid in self.store.smembers(&index).await? {
            if !self.has_session(&sid).await? && self.store.srem(&index, &sid).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(user_id, removed, "pruned stale session ids");
        }
        Ok(removed)
    }

    /// Live session ids for a user, sorted. Prunes stale ids first.
    pub async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, SessionError> {
        self.sync(user_id).await?;
        let mut sids = self.store.smembers(&keys::user_sessions(user_id)).await?;
        sids.sort();
        Ok(sids)
    }

    /// Replace `sid` with a new id for the same user, valid for `ttl`.
    ///
    /// The old id stops resolving. Runs under the session's write lock so
    /// concurrent renewals of one sid cannot both succeed.
    pub async fn renew_session(&self, sid: &str, ttl: Duration) -> Result<String, SessionError> {
        let _guard = self.locks.lock(&keys::session_lock(sid)).await;

        let user = self.get_user_by_sid(sid).await?;
        self.store.del(&keys::session(sid)).await?;
        self.store
            .srem(&keys::user_sessions(&user.id), sid)
            .await?;
        let renewed = self.set_new(&user, ttl).await?;

        info!(user_id = %user.id, "session renewed");
        Ok(renewed)
    }

    /// Resolve `sid`, rotating it when its remaining lifetime is at or
    /// below the refresh threshold.
    pub async fn refresh_if_due(&self, sid: &str) -> Result<Refreshed, SessionError> {
        let user = self.get_user_by_sid(sid).await?;
        let due = match self.remaining_ttl(sid).await? {
            Some(remaining) => remaining <= self.config.refresh_threshold(),
            None => false,
        };

        if !due {
            return Ok(Refreshed {
                sid: sid.to_string(),
                user,
                renewed: false,
            });
        }

        let renewed = self.renew_session(sid, self.config.lifetime()).await?;
        let user = self.get_user_by_sid(&renewed).await?;
        Ok(Refreshed {
            sid: renewed,
            user,
            renewed: true,
        })
    }
}
