//! finassist CLI, the main entry point.
//!
//! Commands:
//! - `chat`     Interactive chat or single-message mode
//! - `check`    Run the deterministic input pre-filter on a message
//! - `threads`  List or delete a user's threads
//! - `config`   Show or initialize configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "finassist",
    about = "finassist: student debt assistant with guarded tool use",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file to use instead of ~/.finassist/config.toml
    #[arg(short, long, global = true, env = "FINASSIST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Thread to continue (a new one is created when omitted)
        #[arg(short, long)]
        thread: Option<String>,

        /// User the thread belongs to
        #[arg(short, long, default_value = "local_user")]
        user: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run the input pre-filter on a message (exit code 1 when blocked)
    Check {
        /// Text to check
        text: String,
    },

    /// List a user's threads
    Threads {
        /// User whose threads to list
        #[arg(short, long, default_value = "local_user")]
        user: String,

        /// Delete this thread instead of listing
        #[arg(long)]
        delete: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,

        /// Print the config file path only
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "finassist=debug" } else { "finassist=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat { thread, user, message } => {
            commands::chat::run(config_path, thread, user, message).await?
        }
        Commands::Check { text } => {
            if commands::check::run(config_path, &text)? {
                std::process::exit(1);
            }
        }
        Commands::Threads { user, delete } => commands::threads::run(config_path, &user, delete).await?,
        Commands::Config { init, path } => commands::config_cmd::run(config_path, init, path)?,
    }

    Ok(())
}
