//! Parley command-line entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, loads configuration, opens the store and dispatches
//! to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use parley_infra::config::{load_config, resolve_data_dir};
use parley_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    let mut config = load_config(&data_dir).await;

    // Command-line verbosity overrides the configured level
    match cli.verbose {
        0 if cli.quiet => config.logging.level = "error".to_string(),
        0 => {}
        1 => config.logging.level = "info,parley_core=debug,parley_infra=debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend;
    }

    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{e}"))?;

    let state = AppState::init(data_dir, config).await?;
    let result = run(cli, &state).await;

    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: &AppState) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Conversation { action } => {
            cli::conversation::handle_conversation_command(action, state, json).await
        }
        Commands::Message { action } => {
            cli::message::handle_message_command(action, state, json).await
        }
        Commands::Active { action } => {
            cli::conversation::handle_active_command(action, state, json).await
        }
        Commands::Presence { action } => {
            cli::presence::handle_presence_command(action, state, json).await
        }
        Commands::Session { action } => {
            cli::session::handle_session_command(action, state, json).await
        }
        Commands::Notification { action } => {
            cli::notification::handle_notification_command(action, state, json).await
        }
        Commands::Status => cli::status::status(state, json).await,
        Commands::Demo { messages } => cli::demo::demo(state, messages, json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
