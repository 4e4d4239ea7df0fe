//! Live round trip through the chat and notification feeds.
//!
//! Pub/sub is process-local, so subscribing in one `parley` invocation and
//! sending from another never meets. This command does both in one process.

use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use parley_core::notification::service::{Delivery, ResendPolicy, SendNotification};
use parley_types::chat::Message;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn demo(state: &AppState, count: usize, json: bool) -> Result<()> {
    let chat = &state.chat_service;
    let token = CancellationToken::new();

    let (conv, created) = chat
        .open_direct_conversation(("demo-alice", "alice"), ("demo-bob", "bob"))
        .await?;
    let mut feed = chat.listen(&token, "demo-bob", &conv.id).await?;

    let mut received = Vec::with_capacity(count);
    for i in 1..=count {
        let msg = Message::text("demo-alice", "alice", format!("hello #{i}"));
        chat.send_message(&conv.id, &msg).await?;
        let got = timeout(RECEIVE_TIMEOUT, feed.next())
            .await
            .context("timed out waiting for the live feed")?
            .context("live feed ended early")?;
        received.push(got);
    }
    feed.close().await;

    state.presence.log("demo-bob").await?;
    let mut inbox = state.notification_service.listen(&token, "demo-bob").await?;
    let delivery = state
        .notification_service
        .send(SendNotification {
            sender_user_id: "demo-alice".to_string(),
            receiver_user_id: "demo-bob".to_string(),
            trigger_id: Some(conv.id.clone()),
            event_id: "message".to_string(),
            content: Some(format!("alice sent you {count} message(s)")),
            resend: ResendPolicy::Always,
        })
        .await?;
    let pushed = match delivery {
        Delivery::Pushed(_) => timeout(RECEIVE_TIMEOUT, inbox.next())
            .await
            .context("timed out waiting for the notification")?,
        _ => None,
    };
    token.cancel();
    inbox.close().await;
    state.presence.unlog("demo-bob").await?;

    let bob_view = chat.get_conversation("demo-bob", &conv.id).await?;

    if json {
        let result = serde_json::json!({
            "conversation": conv.id,
            "created": created,
            "received": received,
            "notification": pushed,
            "bob_unread": bob_view.unread_messages_count,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Conversation {} ({})",
        style("⚡").bold(),
        style(&conv.id).cyan(),
        if created { "new" } else { "existing" }
    );
    for msg in &received {
        println!(
            "  {} {}: {}",
            style("→").green(),
            style(&msg.sender_username).cyan(),
            msg.payload
        );
    }
    match &pushed {
        Some(n) => println!(
            "  {} notification {}: {}",
            style("🔔").bold(),
            style(&n.event_id).cyan(),
            n.content.as_deref().unwrap_or("")
        ),
        None => println!("  {} no notification pushed", style("i").blue().bold()),
    }
    println!(
        "  bob was viewing the conversation, unread stays at {}",
        bob_view.unread_messages_count
    );
    println!();
    Ok(())
}
