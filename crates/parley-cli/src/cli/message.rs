//! Message subcommands: send and page through history.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use parley_core::chat::service::SendReport;
use parley_types::chat::{Message, MessagesPage};
use tracing::warn;

use crate::cli::{UserArg, preview};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// Send a message to a conversation.
    Send {
        /// Conversation id.
        conversation: String,

        /// Sender as user_id[:username].
        #[arg(long = "from")]
        sender: UserArg,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// One page of history as visible to a participant.
    History {
        /// Participant user id.
        user: String,

        /// Conversation id.
        conversation: String,

        /// Visible messages to skip.
        #[arg(long, default_value = "0")]
        offset: usize,
    },
}

/// Exactly one payload kind per message.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// Text content.
    #[arg(long)]
    text: Option<String>,

    /// Award id.
    #[arg(long)]
    award: Option<String>,

    /// Donation amount (positive).
    #[arg(long)]
    donation: Option<i64>,

    /// Path to an audio clip to attach.
    #[arg(long, value_name = "FILE")]
    audio_file: Option<PathBuf>,
}

pub async fn handle_message_command(cmd: MessageCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        MessageCommand::Send {
            conversation,
            sender,
            payload,
        } => {
            let msg = build_message(&sender, payload).await?;
            send(state, &conversation, &msg, json).await
        }
        MessageCommand::History {
            user,
            conversation,
            offset,
        } => {
            let page = state
                .chat_service
                .get_messages(&user, &conversation, offset)
                .await?;
            print_page(&conversation, offset, &page, json)
        }
    }
}

async fn build_message(sender: &UserArg, payload: PayloadArgs) -> Result<Message> {
    let (id, name) = (sender.id.as_str(), sender.name.as_str());
    let msg = match payload {
        PayloadArgs { text: Some(text), .. } => Message::text(id, name, text),
        PayloadArgs { award: Some(award), .. } => Message::award(id, name, award),
        PayloadArgs {
            donation: Some(amount),
            ..
        } => Message::donation(id, name, amount),
        PayloadArgs {
            audio_file: Some(path),
            ..
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read audio file {}", path.display()))?;
            Message::audio(id, name, bytes)
        }
        _ => anyhow::bail!("one of --text, --award, --donation or --audio-file is required"),
    };
    Ok(msg)
}

async fn send(state: &AppState, conversation: &str, msg: &Message, json: bool) -> Result<()> {
    let report = state.chat_service.send_message(conversation, msg).await?;
    warn_if_partial(conversation, &report);

    if json {
        let failures: Vec<_> = report
            .failures
            .iter()
            .map(|f| serde_json::json!({ "user_id": f.user_id, "reason": f.reason }))
            .collect();
        let result = serde_json::json!({
            "message": msg,
            "receivers": report.receivers,
            "unread_incremented": report.unread_incremented,
            "failures": failures,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Sent {} message {} ({} live receiver(s))",
        style("ok").green(),
        msg.kind(),
        style(&report.message_id).cyan(),
        report.receivers,
    );
    if !report.unread_incremented.is_empty() {
        println!(
            "     Unread bumped for: {}",
            report.unread_incremented.join(", ")
        );
    }
    for failure in &report.failures {
        println!(
            "  {} bookkeeping failed for {}: {}",
            style("!").yellow().bold(),
            failure.user_id.as_deref().unwrap_or("(participants)"),
            failure.reason,
        );
    }
    println!();
    Ok(())
}

/// Log a send whose unread bookkeeping did not fully succeed. Returns
/// whether it warned.
fn warn_if_partial(conversation: &str, report: &SendReport) -> bool {
    if !report.is_partial() {
        return false;
    }
    for failure in &report.failures {
        warn!(
            conversation,
            message_id = %report.message_id,
            user_id = failure.user_id.as_deref().unwrap_or("-"),
            reason = %failure.reason,
            "message sent but unread bookkeeping failed"
        );
    }
    true
}

fn print_page(conversation: &str, offset: usize, page: &MessagesPage, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    if page.messages.is_empty() {
        println!();
        println!(
            "  {} No messages in '{}' at offset {}.",
            style("i").blue().bold(),
            style(conversation).cyan(),
            offset
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Sent").fg(Color::White),
        Cell::new("From").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);

    for msg in &page.messages {
        table.add_row(vec![
            Cell::new(msg.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(&msg.sender_username).fg(Color::Cyan),
            Cell::new(msg.kind()).fg(Color::DarkGrey),
            Cell::new(preview(&msg.payload.to_string(), 60)),
        ]);
    }

    println!();
    println!("{table}");
    if page.has_more {
        println!(
            "  More: {}",
            style(format!(
                "--offset {}",
                offset + page.messages.len()
            ))
            .yellow()
        );
    }
    println!();
    Ok(())
}
