//! Kiln CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::KilnConfig;
use kiln_core::CacheKey;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Tiered build-artifact cache", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the artifact root from the configuration
    #[arg(long, global = true)]
    artifact_root: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,kiln_cache=debug,kiln_cli=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = KilnConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.artifact_root {
        config.artifact_root = root;
    }

    match cli.command {
        Commands::Has { id, hash } => handlers::has(&config, CacheKey::new(id, hash)).await?,
        Commands::Fetch { id, hash, dest } => {
            handlers::fetch(&config, CacheKey::new(id, hash), dest).await?
        }
        Commands::Insert {
            id,
            paths,
            hash,
            inputs,
        } => handlers::insert(&config, id, hash, inputs, paths).await?,
        Commands::Delete { id, hash } => {
            handlers::delete(&config, CacheKey::new(id, hash)).await?
        }
        Commands::Probe { group } => handlers::probe(&config, &group).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Path => handlers::config_path()?,
        },
    }

    Ok(())
}
