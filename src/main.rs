//! SkillSwap chat client
//!
//! Terminal client for the SkillSwap skill-exchange chat: room list,
//! realtime room conversations and live notifications.

mod api;
mod auth;
mod chat;
mod config;
mod models;
mod notifications;
mod realtime;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::Session;
use config::Config;

#[derive(Parser)]
#[command(name = "skillswap")]
#[command(about = "Terminal chat client for SkillSwap", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend origin for this run (e.g. https://skillswap.example.com)
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        /// Password (prompted for if omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Log in again even if a valid session exists
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show the stored session and configured endpoints
    Status,

    /// List your chat rooms, most recently active first
    Rooms,

    /// Print a room's message history
    History {
        /// Room ID (from `rooms` output)
        room_id: String,
    },

    /// Send a message to a room
    Send {
        /// Room ID (from `rooms` output)
        #[arg(short, long)]
        room: String,

        /// Message content
        message: String,
    },

    /// Print room activity and notifications until Ctrl+C
    Watch,

    /// Create a chat room for an accepted exchange request
    CreateRoom {
        /// The other participant's user ID
        #[arg(long = "with")]
        with_user: String,

        /// Exchange request ID
        #[arg(long)]
        request: String,
    },

    /// Launch the terminal user interface
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // The TUI owns the terminal, so its logs go to an in-memory buffer.
    let tui_logs = matches!(cli.command, Commands::Tui).then(tui::LogBuffer::new);
    match tui_logs {
        Some(ref logs) => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(logs.clone()),
            )
            .init(),
        None => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }

    let config = Config::load()?.with_base_url(cli.base_url);

    match cli.command {
        Commands::Login {
            email,
            password,
            force,
        } => {
            tracing::info!("Logging in as {}...", email);
            auth::login(config, &email, password, force).await?;
        }
        Commands::Logout => {
            auth::logout(config).await?;
        }
        Commands::Status => {
            auth::status(config).await?;
        }
        Commands::Rooms => {
            let session = Session::require(&config)?;
            api::list_rooms(&config, &session).await?;
        }
        Commands::History { room_id } => {
            let session = Session::require(&config)?;
            api::show_history(&config, &session, &room_id).await?;
        }
        Commands::Send { room, message } => {
            let session = Session::require(&config)?;
            tracing::info!("Sending message...");
            chat::send_message(&config, &session, &room, &message).await?;
        }
        Commands::Watch => {
            let session = Session::require(&config)?;
            chat::watch(&config, &session).await?;
        }
        Commands::CreateRoom { with_user, request } => {
            let session = Session::require(&config)?;
            api::create_room(&config, &session, &with_user, &request).await?;
        }
        Commands::Tui => {
            let session = Session::require(&config)?;
            let logs = tui_logs.unwrap_or_default();
            tui::run(&config, session, logs).await?;
        }
    }

    Ok(())
}
