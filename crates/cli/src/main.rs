//! Intervet CLI — the main entry point.
//!
//! Commands:
//! - `serve` — Start the HTTP API server
//! - `seed`  — Insert the demo role, scenario and RAG corpus

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "intervet",
    about = "Intervet - structured technical interview orchestration",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "intervet.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,

        /// Seed demo data before serving
        #[arg(long)]
        seed: bool,
    },

    /// Insert demo data into an empty store
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port, seed } => commands::serve::run(&cli.config, port, seed).await?,
        Commands::Seed => commands::seed::run(&cli.config).await?,
    }

    Ok(())
}
