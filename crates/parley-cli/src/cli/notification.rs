//! Notification subcommands.

use std::time::Duration;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use parley_core::notification::NotificationRepository;
use parley_core::notification::service::{Delivery, ResendPolicy, SendNotification};

use crate::cli::preview;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum NotificationCommand {
    /// Send a notification; pushed live when the receiver is online.
    Send {
        /// Sender user id.
        #[arg(long = "from")]
        sender: String,

        /// Receiver user id.
        #[arg(long = "to")]
        receiver: String,

        /// Event id (what happened, e.g. "like").
        #[arg(long)]
        event: String,

        /// Trigger id (what it happened on, e.g. a post id).
        #[arg(long)]
        trigger: Option<String>,

        /// Free-form content; long content is truncated.
        #[arg(long)]
        content: Option<String>,

        /// Whether to send again when an identical notification exists.
        #[arg(long, value_enum, default_value_t = Resend::Always)]
        resend: Resend,

        /// With `--resend after`: minimum seconds since the previous one.
        #[arg(long, default_value = "3600")]
        window_secs: u64,
    },

    /// List a user's stored notifications, newest first.
    #[command(alias = "ls")]
    List {
        /// Receiver user id.
        user: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Resend {
    Always,
    Never,
    After,
}

impl Resend {
    fn policy(self, window: Duration) -> ResendPolicy {
        match self {
            Resend::Always => ResendPolicy::Always,
            Resend::Never => ResendPolicy::Never,
            Resend::After => ResendPolicy::After(window),
        }
    }
}

pub async fn handle_notification_command(
    cmd: NotificationCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        NotificationCommand::Send {
            sender,
            receiver,
            event,
            trigger,
            content,
            resend,
            window_secs,
        } => {
            let delivery = state
                .notification_service
                .send(SendNotification {
                    sender_user_id: sender,
                    receiver_user_id: receiver.clone(),
                    trigger_id: trigger,
                    event_id: event,
                    content,
                    resend: resend.policy(Duration::from_secs(window_secs)),
                })
                .await?;
            print_delivery(&receiver, &delivery, json)
        }
        NotificationCommand::List { user } => {
            let notifications = state
                .notification_service
                .repository()
                .list_for(&user)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notifications)?);
                return Ok(());
            }

            if notifications.is_empty() {
                println!();
                println!(
                    "  {} No notifications for '{}'",
                    style("i").blue().bold(),
                    style(&user).cyan()
                );
                println!();
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(presets::UTF8_FULL_CONDENSED);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("Date").fg(Color::White),
                Cell::new("Event").fg(Color::White),
                Cell::new("Trigger").fg(Color::White),
                Cell::new("Content").fg(Color::White),
            ]);
            for n in &notifications {
                table.add_row(vec![
                    Cell::new(n.date.format("%Y-%m-%d %H:%M:%S").to_string()),
                    Cell::new(&n.event_id).fg(Color::Cyan),
                    Cell::new(n.trigger_id.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
                    Cell::new(preview(n.content.as_deref().unwrap_or(""), 50)),
                ]);
            }

            println!();
            println!(
                "  Notifications for '{}' ({})",
                style(&user).cyan(),
                notifications.len()
            );
            println!();
            println!("{table}");
            println!();
            Ok(())
        }
    }
}

fn print_delivery(receiver: &str, delivery: &Delivery, json: bool) -> Result<()> {
    let outcome = match delivery {
        Delivery::Suppressed => "suppressed",
        Delivery::Pushed(_) => "pushed",
        Delivery::Deferred(_) => "deferred",
    };

    if json {
        let result = serde_json::json!({
            "receiver": receiver,
            "delivery": outcome,
            "notification": delivery.notification(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    match delivery {
        Delivery::Suppressed => println!(
            "  {} Suppressed (self-notification or duplicate)",
            style("i").blue().bold()
        ),
        Delivery::Pushed(n) => println!(
            "  {} Pushed {} to '{}'",
            style("ok").green(),
            style(&n.id).cyan(),
            style(receiver).cyan()
        ),
        Delivery::Deferred(n) => println!(
            "  {} '{}' is offline; {} handed to fallback delivery",
            style("ok").green(),
            style(receiver).cyan(),
            style(&n.id).cyan()
        ),
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resend_flag_maps_to_policy() {
        let window = Duration::from_secs(60);
        assert!(matches!(Resend::Never.policy(window), ResendPolicy::Never));
        assert!(matches!(
            Resend::After.policy(window),
            ResendPolicy::After(w) if w == window
        ));
    }
}
