use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flame::config::{CliOverrides, FlameConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "flame")]
#[command(version, about = "Self-hosted start page for apps and bookmarks")]
pub struct Cli {
    /// Directory holding db.sqlite, uploads and flame.toml
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Explicit config file (defaults to <data-dir>/flame.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable permissive CORS for a separately served frontend
        #[arg(long)]
        dev: bool,
    },
    /// Create the data directory, database and a default flame.toml
    Init,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the common case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut overrides = CliOverrides {
        config: cli.config.clone(),
        data_dir: cli.data_dir.clone(),
        ..Default::default()
    };

    match &cli.command {
        Commands::Serve { host, port, dev } => {
            overrides.host = host.clone();
            overrides.port = *port;
            overrides.dev = *dev;
            let config = FlameConfig::resolve(&overrides)?;
            let _guard = flame::logging::init(&config.toml.log)?;
            cmd::cmd_serve(config).await?;
        }
        Commands::Init => cmd::cmd_init(&FlameConfig::resolve(&overrides)?)?,
        Commands::Config { command } => {
            cmd::cmd_config(&FlameConfig::resolve(&overrides)?, *command)?
        }
    }

    Ok(())
}
