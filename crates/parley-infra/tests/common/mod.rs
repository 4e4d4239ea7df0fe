#![allow(dead_code)]

use std::sync::Arc;

use parley_core::chat::service::ChatService;
use parley_core::lock::KeyedLock;
use parley_core::store::KeyValueStore;
use parley_infra::memory::MemoryStore;
use parley_infra::pubsub::PubSubHub;
use parley_infra::sqlite::pool::default_database_url;
use parley_infra::sqlite::store::SqliteStore;
use parley_types::config::ChatConfig;
use tempfile::TempDir;

/// Backends whose pub/sub hub the tests can inspect.
pub trait HasHub {
    fn hub(&self) -> &PubSubHub;
}

impl HasHub for MemoryStore {
    fn hub(&self) -> &PubSubHub {
        MemoryStore::hub(self)
    }
}

impl HasHub for SqliteStore {
    fn hub(&self) -> &PubSubHub {
        SqliteStore::hub(self)
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::default())
}

/// A fresh SQLite store. Keep the `TempDir` alive for the test's duration.
pub async fn sqlite_store() -> (Arc<SqliteStore>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(&default_database_url(dir.path()), PubSubHub::default())
        .await
        .expect("open sqlite store");
    (Arc::new(store), dir)
}

pub fn chat<S: KeyValueStore>(store: Arc<S>) -> ChatService<S> {
    chat_with(store, ChatConfig::default())
}

pub fn chat_with<S: KeyValueStore>(store: Arc<S>, config: ChatConfig) -> ChatService<S> {
    ChatService::new(store, Arc::new(KeyedLock::default()), config)
}

/// Run each named scenario `async fn name<S>(store: Arc<S>)` against both backends.
#[macro_export]
macro_rules! backend_tests {
    ($($name:ident),* $(,)?) => {
        mod memory_backend {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $name() {
                    super::$name(crate::common::memory_store()).await;
                }
            )*
        }

        mod sqlite_backend {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $name() {
                    let (store, _dir) = crate::common::sqlite_store().await;
                    super::$name(store).await;
                }
            )*
        }
    };
}
