//! Store and configuration summary.

use anyhow::Result;
use console::style;
use parley_types::config::StoreBackend;

use crate::state::AppState;

pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let online = state.presence.online_users().await?;
    let config = &state.config;
    let database = match state.store.backend() {
        StoreBackend::Sqlite => Some(
            config
                .store
                .database_url
                .clone()
                .unwrap_or_else(|| state.data_dir.join("parley.db").display().to_string()),
        ),
        StoreBackend::Memory => None,
    };

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "backend": state.store.backend().to_string(),
            "database": database,
            "online_users": online.len(),
            "chat": {
                "messages_limit": config.chat.messages_limit,
                "max_chat_messages": config.chat.max_chat_messages,
            },
            "session": {
                "lifetime_secs": config.session.lifetime_secs,
                "refresh_threshold_secs": config.session.refresh_threshold_secs,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Parley v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Store ──").dim());
    println!("  Backend:  {}", style(state.store.backend()).cyan());
    if let Some(database) = &database {
        println!("  Database: {}", style(database).dim());
    }
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Online:   {}", style(online.len()).bold());
    println!();

    println!("  {}", style("── Limits ──").dim());
    println!("  Page size:        {}", config.chat.messages_limit);
    let retention = if config.chat.max_chat_messages == 0 {
        "unbounded".to_string()
    } else {
        config.chat.max_chat_messages.to_string()
    };
    println!("  Retention:        {retention}");
    println!("  Session lifetime: {}s", config.session.lifetime_secs);
    println!(
        "  Refresh under:    {}s",
        config.session.refresh_threshold_secs
    );
    println!();

    Ok(())
}
