//! SQLite implementation of `KeyValueStore`.
//!
//! One table per value type (see `migrations/`). Reads go through the reader
//! pool, writes through the single-connection writer. String expiry is a
//! Unix-millisecond column filtered at read time; expired rows are deleted
//! lazily on write or by [`SqliteStore::purge_expired`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parley_core::store::{KeyValueStore, Subscription};
use parley_types::error::StoreError;
use sqlx::Row;
use tracing::debug;

use super::pool::DatabasePool;
use crate::pubsub::PubSubHub;

/// SQLite-backed store. Pub/sub is process-local.
pub struct SqliteStore {
    pool: DatabasePool,
    hub: PubSubHub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Hash,
    ZSet,
    Set,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl SqliteStore {
    pub fn new(pool: DatabasePool, hub: PubSubHub) -> Self {
        Self { pool, hub }
    }

    /// Open (and migrate) the database at `database_url`.
    pub async fn open(database_url: &str, hub: PubSubHub) -> Result<Self, StoreError> {
        let pool = DatabasePool::new(database_url).await.map_err(unavailable)?;
        Ok(Self::new(pool, hub))
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn hub(&self) -> &PubSubHub {
        &self.hub
    }

    /// Delete every expired string. Returns how many rows were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let purged = sqlx::query("DELETE FROM kv_strings WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "purged expired strings");
        }
        Ok(purged)
    }

    async fn kind_of(&self, key: &str) -> Result<Option<Kind>, StoreError> {
        let row = sqlx::query(
            r#"SELECT
                 EXISTS(SELECT 1 FROM kv_strings WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)) AS is_string,
                 EXISTS(SELECT 1 FROM kv_hashes WHERE key = ?1) AS is_hash,
                 EXISTS(SELECT 1 FROM kv_zsets WHERE key = ?1) AS is_zset,
                 EXISTS(SELECT 1 FROM kv_sets WHERE key = ?1) AS is_set"#,
        )
        .bind(key)
        .bind(now_ms())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        for (column, kind) in [
            ("is_string", Kind::String),
            ("is_hash", Kind::Hash),
            ("is_zset", Kind::ZSet),
            ("is_set", Kind::Set),
        ] {
            let present: i64 = row.try_get(column).map_err(unavailable)?;
            if present != 0 {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    /// Fail with `WrongType` if `key` holds a value of another kind.
    async fn expect_kind(&self, key: &str, kind: Kind) -> Result<(), StoreError> {
        match self.kind_of(key).await? {
            Some(found) if found != kind => Err(StoreError::WrongType(key.to_string())),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyValueStore implementation
// ---------------------------------------------------------------------------

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT value FROM kv_strings WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Ok(Some(row.try_get("value").map_err(unavailable)?)),
            None => {
                self.expect_kind(key, Kind::String).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| {
            now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });

        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;
        for table in ["kv_hashes", "kv_zsets", "kv_sets"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE key = ?"))
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        sqlx::query(
            r#"INSERT INTO kv_strings (key, value, expires_at) VALUES (?, ?, ?)
               ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

        sqlx::query("DELETE FROM kv_strings WHERE key = ? AND expires_at IS NOT NULL AND expires_at <= ?")
            .bind(key)
            .bind(now_ms())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        let mut removed = 0;
        for table in ["kv_strings", "kv_hashes", "kv_zsets", "kv_sets"] {
            removed += sqlx::query(&format!("DELETE FROM {table} WHERE key = ?"))
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?
                .rows_affected();
        }
        tx.commit().await.map_err(unavailable)?;

        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = now_ms();
        let row = sqlx::query(
            "SELECT expires_at FROM kv_strings WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: Option<i64> = row.try_get("expires_at").map_err(unavailable)?;
        Ok(expires_at.map(|at| Duration::from_millis(u64::try_from(at - now).unwrap_or(0))))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_hashes WHERE key = ? AND field = ?")
            .bind(key)
            .bind(field)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Ok(Some(row.try_get("value").map_err(unavailable)?)),
            None => {
                self.expect_kind(key, Kind::Hash).await?;
                Ok(None)
            }
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.expect_kind(key, Kind::Hash).await?;
        sqlx::query(
            r#"INSERT INTO kv_hashes (key, field, value) VALUES (?, ?, ?)
               ON CONFLICT (key, field) DO UPDATE SET value = excluded.value"#,
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool.writer)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT field, value FROM kv_hashes WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(unavailable)?;

        if rows.is_empty() {
            self.expect_kind(key, Kind::Hash).await?;
        }

        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let field: String = row.try_get("field").map_err(unavailable)?;
            let value: String = row.try_get("value").map_err(unavailable)?;
            map.insert(field, value);
        }
        Ok(map)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let removed = sqlx::query("DELETE FROM kv_hashes WHERE key = ? AND field = ?")
            .bind(key)
            .bind(field)
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?
            .rows_affected();

        if removed == 0 {
            self.expect_kind(key, Kind::Hash).await?;
        }
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.expect_kind(key, Kind::ZSet).await?;
        sqlx::query(
            r#"INSERT INTO kv_zsets (key, member, score) VALUES (?, ?, ?)
               ON CONFLICT (key, member) DO UPDATE SET score = excluded.score"#,
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&self.pool.writer)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        if min > max || min == f64::INFINITY || max == f64::NEG_INFINITY {
            return Ok(Vec::new());
        }

        // Infinite bounds are left out of the SQL rather than bound as REALs.
        let mut sql = String::from("SELECT member FROM kv_zsets WHERE key = ?");
        if min.is_finite() {
            sql.push_str(" AND score >= ?");
        }
        if max.is_finite() {
            sql.push_str(" AND score <= ?");
        }
        sql.push_str(" ORDER BY score ASC, member ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql).bind(key);
        if min.is_finite() {
            query = query.bind(min);
        }
        if max.is_finite() {
            query = query.bind(max);
        }
        let rows = query
            .bind(as_i64(count))
            .bind(as_i64(offset))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(unavailable)?;

        if rows.is_empty() {
            self.expect_kind(key, Kind::ZSet).await?;
        }
        rows.iter()
            .map(|row| row.try_get("member").map_err(unavailable))
            .collect()
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        if stop < start {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT member FROM kv_zsets WHERE key = ? ORDER BY score DESC, member DESC LIMIT ? OFFSET ?",
        )
        .bind(key)
        .bind(as_i64(stop - start + 1))
        .bind(as_i64(start))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        if rows.is_empty() {
            self.expect_kind(key, Kind::ZSet).await?;
        }
        rows.iter()
            .map(|row| row.try_get("member").map_err(unavailable))
            .collect()
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM kv_zsets WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        let n: i64 = row.try_get("n").map_err(unavailable)?;
        if n == 0 {
            self.expect_kind(key, Kind::ZSet).await?;
        }
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> Result<usize, StoreError> {
        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM kv_zsets WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .map_err(unavailable)?;
        let n: i64 = row.try_get("n").map_err(unavailable)?;
        let excess = n - as_i64(max_len);
        if excess <= 0 {
            tx.commit().await.map_err(unavailable)?;
            return Ok(0);
        }

        let removed = sqlx::query(
            r#"DELETE FROM kv_zsets WHERE key = ?1 AND member IN (
                 SELECT member FROM kv_zsets WHERE key = ?1 ORDER BY score ASC, member ASC LIMIT ?2
               )"#,
        )
        .bind(key)
        .bind(excess)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?
        .rows_affected();
        tx.commit().await.map_err(unavailable)?;

        Ok(usize::try_from(removed).unwrap_or(0))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.expect_kind(key, Kind::Set).await?;
        let added = sqlx::query("INSERT OR IGNORE INTO kv_sets (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?
            .rows_affected();
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed = sqlx::query("DELETE FROM kv_sets WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?
            .rows_affected();
        if removed == 0 {
            self.expect_kind(key, Kind::Set).await?;
        }
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM kv_sets WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        if row.is_none() {
            self.expect_kind(key, Kind::Set).await?;
        }
        Ok(row.is_some())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT member FROM kv_sets WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        if rows.is_empty() {
            self.expect_kind(key, Kind::Set).await?;
        }
        rows.iter()
            .map(|row| row.try_get("member").map_err(unavailable))
            .collect()
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        Ok(self.hub.publish(channel, payload))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        Ok(self.hub.subscribe(channel))
    }
}
