//! Presence subcommands.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum PresenceCommand {
    /// Mark a user online.
    Online {
        /// User id.
        user: String,
    },

    /// Mark a user offline.
    Offline {
        /// User id.
        user: String,
    },

    /// Check whether a user is online.
    Check {
        /// User id.
        user: String,
    },

    /// List online users.
    #[command(alias = "ls")]
    List,
}

pub async fn handle_presence_command(cmd: PresenceCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        PresenceCommand::Online { user } => {
            state.presence.log(&user).await?;
            print_status(&user, true, json)
        }
        PresenceCommand::Offline { user } => {
            state.presence.unlog(&user).await?;
            print_status(&user, false, json)
        }
        PresenceCommand::Check { user } => {
            let online = state.presence.is_online(&user).await?;
            print_status(&user, online, json)
        }
        PresenceCommand::List => {
            let users = state.presence.online_users().await?;
            if json {
                let result = serde_json::json!({
                    "online": users,
                    "count": users.len(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!();
            if users.is_empty() {
                println!("  {} Nobody is online.", style("i").blue().bold());
            } else {
                println!("  Online ({})", users.len());
                for user in &users {
                    println!("  {} {}", style("●").green(), style(user).cyan());
                }
            }
            println!();
            Ok(())
        }
    }
}

fn print_status(user: &str, online: bool, json: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "user": user,
            "online": online,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let marker = if online {
        style("online").green()
    } else {
        style("offline").dim()
    };
    println!();
    println!("  '{}' is {}", style(user).cyan(), marker);
    println!();
    Ok(())
}
