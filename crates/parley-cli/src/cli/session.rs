//! Session subcommands: issue, inspect, rotate and revoke session ids.

use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use console::style;
use parley_types::session::SessionUser;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Issue a new session id for a user.
    New {
        /// User id.
        user: String,

        /// Lifetime in seconds (default: configured session lifetime).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Resolve a session id to its user and expiry.
    Show {
        /// Session id.
        sid: String,
    },

    /// Replace a session id with a fresh one.
    Renew {
        /// Session id.
        sid: String,

        /// Lifetime of the new id in seconds (default: configured lifetime).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Rotate a session id only if it is close to expiry.
    Refresh {
        /// Session id.
        sid: String,
    },

    /// Revoke a session id.
    #[command(alias = "rm")]
    Delete {
        /// Session id.
        sid: String,
    },

    /// Prune expired ids from a user's session index.
    Sync {
        /// User id.
        user: String,
    },

    /// List a user's live session ids.
    #[command(alias = "ls")]
    List {
        /// User id.
        user: String,
    },
}

pub async fn handle_session_command(cmd: SessionCommand, state: &AppState, json: bool) -> Result<()> {
    let sessions = &state.session_manager;
    let ttl = |secs: Option<u64>| secs.map_or(sessions.config().lifetime(), Duration::from_secs);

    match cmd {
        SessionCommand::New { user, ttl_secs } => {
            let sid = sessions
                .set_new(&SessionUser::new(user.clone()), ttl(ttl_secs))
                .await?;
            print_sid("Issued", &user, &sid, json)
        }
        SessionCommand::Show { sid } => {
            let session = sessions.describe(&sid).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
                return Ok(());
            }
            println!();
            println!("  {} {}", style("Session").bold(), style(&session.sid).cyan());
            println!("  User:     {}", style(&session.user_id).cyan());
            match session.expires_at {
                Some(at) => println!("  Expires:  {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Expires:  {}", style("never").yellow()),
            }
            println!();
            Ok(())
        }
        SessionCommand::Renew { sid, ttl_secs } => {
            let user = sessions.get_user_by_sid(&sid).await?;
            let renewed = sessions.renew_session(&sid, ttl(ttl_secs)).await?;
            print_sid("Renewed", &user.id, &renewed, json)
        }
        SessionCommand::Refresh { sid } => {
            let refreshed = sessions.refresh_if_due(&sid).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&refreshed)?);
                return Ok(());
            }
            if refreshed.renewed {
                print_sid("Rotated", &refreshed.user.id, &refreshed.sid, false)
            } else {
                println!();
                println!(
                    "  {} Session for '{}' is not due for rotation",
                    style("i").blue().bold(),
                    style(&refreshed.user.id).cyan()
                );
                println!();
                Ok(())
            }
        }
        SessionCommand::Delete { sid } => {
            sessions.delete(&sid).await?;
            if json {
                println!("{}", serde_json::json!({ "deleted": sid }));
            } else {
                println!();
                println!("  {} Session revoked", style("ok").green());
                println!();
            }
            Ok(())
        }
        SessionCommand::Sync { user } => {
            let pruned = sessions.sync(&user).await?;
            if json {
                println!("{}", serde_json::json!({ "user": user, "pruned": pruned }));
            } else {
                println!();
                println!(
                    "  {} Pruned {} stale session id(s) for '{}'",
                    style("ok").green(),
                    pruned,
                    style(&user).cyan()
                );
                println!();
            }
            Ok(())
        }
        SessionCommand::List { user } => {
            let sids = sessions.sessions_for(&user).await?;
            if json {
                let result = serde_json::json!({
                    "user": user,
                    "sessions": sids,
                    "count": sids.len(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!();
            if sids.is_empty() {
                println!(
                    "  {} No live sessions for '{}'",
                    style("i").blue().bold(),
                    style(&user).cyan()
                );
            } else {
                println!("  Sessions for '{}' ({})", style(&user).cyan(), sids.len());
                for sid in &sids {
                    println!("  {}", sid);
                }
            }
            println!();
            Ok(())
        }
    }
}

fn print_sid(verb: &str, user: &str, sid: &str, json: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "user": user,
            "sid": sid,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} session for '{}':",
        style("ok").green(),
        verb,
        style(user).cyan()
    );
    println!();
    println!("  {}", style(sid).yellow().bold());
    println!();
    Ok(())
}
