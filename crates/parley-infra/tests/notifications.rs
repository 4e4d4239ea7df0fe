mod common;

use std::sync::Arc;
use std::time::Duration;

use parley_core::notification::NotificationRepository;
use parley_core::notification::fanout::NotificationFanout;
use parley_core::notification::service::{
    Delivery, NotificationService, ResendPolicy, SendNotification,
};
use parley_core::presence::PresenceTracker;
use parley_core::store::KeyValueStore;
use parley_infra::notification::{KvNotificationRepository, TracingFallback};
use parley_types::config::NotificationConfig;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

type Service<S> = NotificationService<S, KvNotificationRepository<S>, TracingFallback>;

fn service<S: KeyValueStore>(store: &Arc<S>) -> (Service<S>, PresenceTracker<S>) {
    let presence = PresenceTracker::new(Arc::clone(store));
    let service = NotificationService::new(
        NotificationFanout::new(Arc::clone(store), 16),
        presence.clone(),
        KvNotificationRepository::new(Arc::clone(store)),
        TracingFallback,
        NotificationConfig::default(),
    );
    (service, presence)
}

fn comment(sender: &str, receiver: &str, resend: ResendPolicy) -> SendNotification {
    SendNotification {
        sender_user_id: sender.to_string(),
        receiver_user_id: receiver.to_string(),
        trigger_id: Some("post-7".to_string()),
        event_id: "comment".to_string(),
        content: Some("nice post ".repeat(20)),
        resend,
    }
}

async fn online_receiver_gets_a_live_push<S: KeyValueStore + 'static>(store: Arc<S>) {
    let (service, presence) = service(&store);
    presence.log("bob").await.unwrap();

    let token = CancellationToken::new();
    let mut feed = service.listen(&token, "bob").await.unwrap();

    let delivery = service
        .send(comment("alice", "bob", ResendPolicy::Always))
        .await
        .unwrap();
    let Delivery::Pushed(sent) = delivery else {
        panic!("expected a push, got {delivery:?}");
    };

    let received = timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, sent);
    assert_eq!(received.content.as_deref().map(|c| c.chars().count()), Some(64));
    assert_eq!(received.trigger_id.as_deref(), Some("post-7"));
}

async fn offline_receiver_is_deferred_and_recorded<S: KeyValueStore>(store: Arc<S>) {
    let (service, presence) = service(&store);
    presence.log("bob").await.unwrap();
    presence.unlog("bob").await.unwrap();

    let delivery = service
        .send(comment("alice", "bob", ResendPolicy::Always))
        .await
        .unwrap();
    assert!(matches!(delivery, Delivery::Deferred(_)));

    let stored = service.repository().list_for("bob").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(Some(&stored[0]), delivery.notification());
    assert!(!stored[0].read);
}

async fn self_notifications_are_never_sent<S: KeyValueStore>(store: Arc<S>) {
    let (service, presence) = service(&store);
    presence.log("alice").await.unwrap();

    let delivery = service
        .send(comment("alice", "alice", ResendPolicy::Always))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Suppressed);
    assert!(service.repository().list_for("alice").await.unwrap().is_empty());
}

async fn resend_policy_gates_duplicates_per_key<S: KeyValueStore>(store: Arc<S>) {
    let (service, _presence) = service(&store);

    let first = service
        .send(comment("alice", "bob", ResendPolicy::Never))
        .await
        .unwrap();
    assert!(first.notification().is_some());

    let again = service
        .send(comment("alice", "bob", ResendPolicy::Never))
        .await
        .unwrap();
    assert_eq!(again, Delivery::Suppressed);

    let windowed = service
        .send(comment("alice", "bob", ResendPolicy::After(Duration::from_secs(600))))
        .await
        .unwrap();
    assert_eq!(windowed, Delivery::Suppressed);

    // A different sender is a different key.
    let other = service
        .send(comment("carol", "bob", ResendPolicy::Never))
        .await
        .unwrap();
    assert!(other.notification().is_some());

    let forced = service
        .send(comment("alice", "bob", ResendPolicy::Always))
        .await
        .unwrap();
    assert!(forced.notification().is_some());

    let stored = service.repository().list_for("bob").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|n| Some(n) == forced.notification()));
}

backend_tests!(
    online_receiver_gets_a_live_push,
    offline_receiver_is_deferred_and_recorded,
    self_notifications_are_never_sent,
    resend_policy_gates_duplicates_per_key,
);
