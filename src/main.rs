mod app;
mod auth;
mod commands;
mod config;
mod error;
mod format;
mod llm;
mod logging;
mod message;
mod orchestrator;
mod prompts;
mod session;
mod state;
mod store;
#[cfg(test)]
mod testing;
mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;
use logging::LogTarget;
use state::AppState;

#[derive(Parser)]
#[command(name = "studymate")]
#[command(version)]
#[command(about = "Study assistant chat in your terminal", long_about = None)]
struct Cli {
    /// Directory for config, session and log files
    #[arg(long, env = "STUDYMATE_HOME", global = true)]
    home: Option<PathBuf>,

    /// More logging (-v info, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat (default)
    Chat,
    /// Ask one question and print the answer
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Sign in, or create an account with --register
    Login {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        register: bool,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List saved messages
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Delete one saved message by id
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.home.as_deref())?;

    let log_path = config.log_path();
    let target = match cli.command {
        None | Some(Commands::Chat) => LogTarget::File(&log_path),
        Some(_) => LogTarget::Stderr,
    };
    logging::init(cli.verbose, cli.quiet, target)?;

    if let Some(Commands::Config { init }) = cli.command {
        return commands::show_config(&config, init);
    }

    let state = AppState::init(config)?;

    match cli.command {
        None | Some(Commands::Chat) => app::run(state).await?,
        Some(Commands::Ask { question }) => {
            commands::ask(&state, &question.join(" ")).await?;
        }
        Some(Commands::Login { email, register }) => {
            commands::login(&state, email, register).await?;
        }
        Some(Commands::Logout) => commands::logout(&state).await?,
        Some(Commands::Whoami) => commands::whoami(&state).await?,
        Some(Commands::History { limit, action }) => match action {
            Some(HistoryAction::Delete { id }) => commands::delete_message(&state, &id).await?,
            None => commands::list_history(&state, limit).await?,
        },
        Some(Commands::Config { .. }) => {}
    }

    Ok(())
}
