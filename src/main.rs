use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rysen::{cli, config, server};

#[derive(Parser)]
#[command(name = "rysen", version, about = "Spiritual companion backend")]
struct Cli {
    /// Config file (defaults to ~/.rysen/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Clear a user's pastoral memory
    Reset { user_id: String },
    /// Show a user's pastoral memory
    Inspect { user_id: String },
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check database health
    Doctor,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete expired entries from the shared cache table
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::RysenConfig::load_from(path)?,
        None => config::RysenConfig::load()?,
    };

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Reset { user_id } => cli::reset::reset(&config, &user_id)?,
        Command::Inspect { user_id } => cli::inspect::inspect(&config, &user_id)?,
        Command::Cache { action } => match action {
            CacheAction::Purge => cli::purge::purge(&config)?,
        },
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
