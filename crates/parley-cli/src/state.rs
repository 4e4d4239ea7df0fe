//! Application state wiring all services together.
//!
//! Services are generic over the store and notification traits; AppState pins
//! them to the backend chosen by configuration.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::chat::service::ChatService;
use parley_core::lock::KeyedLock;
use parley_core::notification::fanout::NotificationFanout;
use parley_core::notification::service::NotificationService;
use parley_core::presence::PresenceTracker;
use parley_core::session::SessionManager;
use parley_infra::any::{AnyStore, open_store};
use parley_infra::notification::{KvNotificationRepository, TracingFallback};
use parley_types::config::ParleyConfig;

pub type ConcreteChatService = ChatService<AnyStore>;

pub type ConcreteSessionManager = SessionManager<AnyStore>;

pub type ConcreteNotificationService =
    NotificationService<AnyStore, KvNotificationRepository<AnyStore>, TracingFallback>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AnyStore>,
    pub chat_service: Arc<ConcreteChatService>,
    pub session_manager: Arc<ConcreteSessionManager>,
    pub notification_service: Arc<ConcreteNotificationService>,
    pub presence: PresenceTracker<AnyStore>,
    pub config: ParleyConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the configured store and wire every service over it.
    ///
    /// Chat and sessions share one keyed lock table.
    pub async fn init(data_dir: PathBuf, config: ParleyConfig) -> anyhow::Result<Self> {
        let store = Arc::new(open_store(&config.store, &data_dir).await?);
        let locks = Arc::new(KeyedLock::new(config.lock.shards));

        let chat_service = ChatService::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            config.chat.clone(),
        );
        let session_manager = SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            config.session.clone(),
        );

        let presence = PresenceTracker::new(Arc::clone(&store));
        let notification_service = NotificationService::new(
            NotificationFanout::new(Arc::clone(&store), config.chat.feed_buffer),
            presence.clone(),
            KvNotificationRepository::new(Arc::clone(&store)),
            TracingFallback,
            config.notifications.clone(),
        );

        Ok(Self {
            store,
            chat_service: Arc::new(chat_service),
            session_manager: Arc::new(session_manager),
            notification_service: Arc::new(notification_service),
            presence,
            config,
            data_dir,
        })
    }
}
