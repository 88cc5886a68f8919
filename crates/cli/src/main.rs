//! Try-on bot CLI, the main entry point.
//!
//! Commands:
//! - `onboard`: write a default config and create storage directories
//! - `gateway`: start the HTTP webhook server
//! - `status`: show the effective configuration
//! - `chat`: talk to the session engine from the terminal
//! - `ledger`: print a user's records and compositions

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tryon",
    about = "Virtual try-on chat bot",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and storage directories
    Onboard,

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show configuration status
    Status,

    /// Chat with the bot locally; attach images with `@path`
    Chat {
        /// User identifier for the session
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Print a user's ledger
    Ledger {
        /// User identifier to inspect
        #[arg(short, long)]
        user: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Chat { user } => commands::chat::run(user).await?,
        Commands::Ledger { user, json } => commands::ledger::run(user, json).await?,
    }

    Ok(())
}
