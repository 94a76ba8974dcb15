//! CLI for the dlc download-session coordinator.

mod client;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlc_core::config;
use dlc_core::pending_db::PendingDb;

use commands::{run_check, run_clear_pending, run_pending, run_serve, run_submit};

/// Top-level CLI for the dlc coordinator.
#[derive(Debug, Parser)]
#[command(name = "dlc")]
#[command(about = "dlc: download-session coordinator between browser extensions and a download engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the coordinator: accept extension connections and drive the engine.
    Serve {
        /// Address to listen on (overrides `listen_addr` in config.toml).
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Engine WebSocket URL (overrides `engine_url` in config.toml).
        #[arg(long, value_name = "URL")]
        engine_url: Option<String>,
    },

    /// List engine commands persisted while the engine was unreachable.
    Pending,

    /// Drop all persisted engine commands.
    ClearPending,

    /// Ask a running coordinator whether the engine is connected.
    Check {
        /// Also ask the coordinator to reconnect to the engine immediately.
        #[arg(long)]
        reconnect: bool,
    },

    /// Submit a download to a running coordinator, as an extension would.
    Submit {
        /// URL to download (direct file or interstitial page).
        url: String,
        /// Proposed file name.
        #[arg(long, value_name = "NAME")]
        file_name: Option<String>,
    },

    /// Print the path of the config file.
    ConfigPath,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { listen, engine_url } => {
                if let Some(addr) = listen {
                    cfg.listen_addr = addr;
                }
                if let Some(url) = engine_url {
                    cfg.engine_url = url;
                }
                run_serve(&cfg).await?;
            }
            CliCommand::Pending => run_pending(&PendingDb::open_default().await?).await?,
            CliCommand::ClearPending => {
                run_clear_pending(&PendingDb::open_default().await?).await?
            }
            CliCommand::Check { reconnect } => run_check(&cfg.listen_addr, reconnect).await?,
            CliCommand::Submit { url, file_name } => {
                run_submit(&cfg.listen_addr, &url, file_name).await?
            }
            CliCommand::ConfigPath => println!("{}", config::config_path()?.display()),
        }

        Ok(())
    }
}
