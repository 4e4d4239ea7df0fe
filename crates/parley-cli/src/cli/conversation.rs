//! Conversation and active-conversation subcommands.

use anyhow::{Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use parley_types::chat::{Conversation, Participant};

use crate::cli::{UserArg, preview};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ConversationCommand {
    /// Create a conversation; every participant joins now.
    Create {
        /// Participants as user_id[:username]. Repeat for each member.
        #[arg(required = true, num_args = 1..)]
        users: Vec<UserArg>,
    },

    /// List a user's conversations, most recently active first.
    #[command(alias = "ls")]
    List {
        /// Owner user id.
        user: String,
    },

    /// Show one conversation as seen by a participant.
    Show {
        /// Owner user id.
        user: String,

        /// Conversation id.
        conversation: String,
    },

    /// Conversations whose participants are exactly `user` and `other`.
    With {
        /// Owner user id.
        user: String,

        /// The other participant's user id.
        other: String,
    },

    /// Mark a conversation read for a user (reset unread to 0).
    Read {
        /// Owner user id.
        user: String,

        /// Conversation id.
        conversation: String,
    },

    /// Open the direct conversation between two users, creating it if needed.
    #[command(name = "open-direct")]
    OpenDirect {
        /// First user as user_id[:username].
        first: UserArg,

        /// Second user as user_id[:username].
        second: UserArg,
    },

    /// Add a participant to an existing conversation.
    Add {
        /// An existing participant's user id.
        owner: String,

        /// Conversation id.
        conversation: String,

        /// New participant as user_id[:username].
        participant: UserArg,
    },
}

#[derive(Subcommand)]
pub enum ActiveCommand {
    /// Record the conversation a user is viewing.
    Set {
        /// User id.
        user: String,

        /// Conversation id.
        conversation: String,
    },

    /// Clear a user's active conversation.
    Clear {
        /// User id.
        user: String,
    },

    /// Print a user's active conversation.
    Show {
        /// User id.
        user: String,
    },
}

pub async fn handle_conversation_command(
    cmd: ConversationCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ConversationCommand::Create { users } => create(state, users, json).await,
        ConversationCommand::List { user } => {
            let conversations = state.chat_service.get_conversations(&user).await?;
            print_list(&user, &conversations, json)
        }
        ConversationCommand::Show { user, conversation } => {
            let conv = state
                .chat_service
                .get_conversation(&user, &conversation)
                .await?;
            print_conversation(&conv, json)
        }
        ConversationCommand::With { user, other } => {
            let conversations = state
                .chat_service
                .get_conversations_with_user(&user, &other)
                .await?;
            print_list(&user, &conversations, json)
        }
        ConversationCommand::Read { user, conversation } => {
            state
                .chat_service
                .read_conversation_messages(&user, &conversation)
                .await?;
            if json {
                let result = serde_json::json!({
                    "conversation": conversation,
                    "user": user,
                    "unread": 0,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!();
                println!(
                    "  {} Marked '{}' read for '{}'",
                    style("ok").green(),
                    style(&conversation).cyan(),
                    style(&user).cyan(),
                );
                println!();
            }
            Ok(())
        }
        ConversationCommand::OpenDirect { first, second } => {
            let (conv, created) = state
                .chat_service
                .open_direct_conversation(
                    (first.id.as_str(), first.name.as_str()),
                    (second.id.as_str(), second.name.as_str()),
                )
                .await?;
            if json {
                let result = serde_json::json!({
                    "conversation": conv,
                    "created": created,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            println!();
            let verb = if created { "Created" } else { "Found" };
            println!(
                "  {} {} direct conversation {}",
                style("ok").green(),
                verb,
                style(&conv.id).cyan().bold(),
            );
            println!();
            Ok(())
        }
        ConversationCommand::Add {
            owner,
            conversation,
            participant,
        } => {
            let conv = state
                .chat_service
                .add_participant(
                    &owner,
                    &conversation,
                    Participant::new(participant.id, participant.name, chrono::Utc::now()),
                )
                .await?;
            print_conversation(&conv, json)
        }
    }
}

pub async fn handle_active_command(cmd: ActiveCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ActiveCommand::Set { user, conversation } => {
            state
                .chat_service
                .set_active_conversation(&user, &conversation)
                .await?;
            print_active(&user, Some(&conversation), json)
        }
        ActiveCommand::Clear { user } => {
            state.chat_service.delete_active_conversation(&user).await?;
            print_active(&user, None, json)
        }
        ActiveCommand::Show { user } => {
            let active = state.chat_service.active_conversation(&user).await?;
            print_active(&user, active.as_deref(), json)
        }
    }
}

async fn create(state: &AppState, users: Vec<UserArg>, json: bool) -> Result<()> {
    if users.is_empty() {
        bail!("a conversation needs at least one participant");
    }
    let conv = Conversation::new(users.into_iter().map(|u| (u.id, u.name)))?;
    state.chat_service.create_conversation(&conv).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conv)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created conversation {} with {} participant(s)",
        style("ok").green(),
        style(&conv.id).cyan().bold(),
        conv.participants.len(),
    );
    println!();
    Ok(())
}

fn print_active(user: &str, conversation: Option<&str>, json: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "user": user,
            "active_conversation": conversation,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    match conversation {
        Some(id) => println!(
            "  '{}' is viewing {}",
            style(user).cyan(),
            style(id).cyan().bold()
        ),
        None => println!(
            "  {} '{}' has no active conversation",
            style("i").blue().bold(),
            style(user).cyan()
        ),
    }
    println!();
    Ok(())
}

fn print_list(user: &str, conversations: &[Conversation], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!();
        println!(
            "  {} No conversations for '{}'. Start one with: {}",
            style("i").blue().bold(),
            style(user).cyan(),
            style(format!("parley conversation create {user} <other>")).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Participants").fg(Color::White),
        Cell::new("Unread").fg(Color::White),
        Cell::new("Last Activity").fg(Color::White),
        Cell::new("Last Message").fg(Color::White),
    ]);

    for conv in conversations {
        let names: Vec<&str> = conv
            .participants
            .values()
            .map(|p| p.username.as_str())
            .collect();
        let last = conv
            .last_message
            .as_ref()
            .map(|m| preview(&format!("{}: {}", m.sender_username, m.payload), 40))
            .unwrap_or_else(|| "-".to_string());
        let unread = if conv.unread_messages_count > 0 {
            Cell::new(conv.unread_messages_count).fg(Color::Yellow)
        } else {
            Cell::new(0).fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(&conv.id).fg(Color::Cyan),
            Cell::new(preview(&names.join(", "), 30)),
            unread,
            Cell::new(conv.last_activity().format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(last).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!(
        "  Conversations for '{}' ({})",
        style(user).cyan(),
        conversations.len()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn print_conversation(conv: &Conversation, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conv)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Conversation").bold(), style(&conv.id).cyan());
    println!(
        "  Created:  {}",
        conv.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Unread:   {}", conv.unread_messages_count);
    if let Some(last) = &conv.last_message {
        println!(
            "  Last:     {} {}",
            style(&last.sender_username).cyan(),
            preview(&last.payload.to_string(), 60)
        );
    }
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("User Id").fg(Color::White),
        Cell::new("Username").fg(Color::White),
        Cell::new("Joined").fg(Color::White),
    ]);
    for participant in conv.participants.values() {
        table.add_row(vec![
            Cell::new(&participant.user_id).fg(Color::Cyan),
            Cell::new(&participant.username),
            Cell::new(participant.joined_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
