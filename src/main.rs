//! swarm-poold - SwarmPool Pool Daemon
//!
//! The long-running operator process that ingests job announcements,
//! arbitrates claims, validates proofs, tracks miner liveness, runs the
//! epoch lifecycle, and publishes authoritative pool state.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod adapters;
mod config;
mod crypto;
mod daemon;
mod epoch;
mod error;
mod models;
mod router;
mod schema;
mod state;
mod supervisor;

use config::Config;

/// SwarmPool Pool Daemon
#[derive(Parser)]
#[command(name = "swarm-poold")]
#[command(author = "SudoHash LLC")]
#[command(version = "0.1.0")]
#[command(about = "Epoch-sealing coordinator for decentralized GPU compute", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pool ENS address
    #[arg(long, global = true, default_value = "swarmpool.eth")]
    pool: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool daemon (blocks until shut down)
    Run {
        /// Operator signing key (or use SWARM_OPERATOR_KEY env / config file)
        #[arg(long, env = "SWARM_OPERATOR_KEY")]
        key: Option<String>,

        /// Content-store adapter address (overrides config)
        #[arg(long)]
        content_store_api: Option<String>,

        /// Durable sidecar address (overrides config)
        #[arg(long)]
        sidecar_url: Option<String>,

        /// Epoch seal cadence in seconds (overrides config)
        #[arg(long)]
        epoch_duration_seconds: Option<u64>,

        /// Claim reclamation horizon in seconds (overrides config)
        #[arg(long)]
        claim_timeout_seconds: Option<u64>,

        /// Heartbeat staleness threshold in seconds (overrides config)
        #[arg(long)]
        miner_timeout_seconds: Option<u64>,
    },

    /// Show or edit daemon configuration
    Config {
        /// Show config file path only
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            key,
            content_store_api,
            sidecar_url,
            epoch_duration_seconds,
            claim_timeout_seconds,
            miner_timeout_seconds,
        } => {
            print_banner();

            let mut cfg = config::load_config().unwrap_or_default();
            cfg.pool_ens = cli.pool.clone();
            if let Some(key) = key {
                cfg.operator_private_key = Some(key);
            }
            if let Some(v) = content_store_api {
                cfg.content_store_api = v;
            }
            if let Some(v) = sidecar_url {
                cfg.sidecar_url = v;
            }
            if let Some(v) = epoch_duration_seconds {
                cfg.epoch_duration_seconds = v;
            }
            if let Some(v) = claim_timeout_seconds {
                cfg.claim_timeout_seconds = v;
            }
            if let Some(v) = miner_timeout_seconds {
                cfg.miner_timeout_seconds = v;
            }

            let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
            let shutdown_flag = running.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown_flag.store(false, std::sync::atomic::Ordering::Relaxed);
            });

            daemon::run(cfg, running).await?;
        }

        Commands::Config { path } => {
            let config_path = config::get_config_path()?;
            if path {
                println!("{}", config_path.display());
            } else {
                println!("Config file: {}", config_path.display());
                if config_path.exists() {
                    let cfg: Config = config::load_config()?;
                    println!("\n{}", serde_json::to_string_pretty(&cfg)?);
                } else {
                    println!("(not created yet - defaults will be used on 'swarm-poold run')");
                }
            }
        }
    }

    Ok(())
}

fn print_banner() {
    let banner = r#"
   _____ _       __   ___    ____  __  ___
  / ___/| |     / /  /   |  / __ \/  |/  /
  \__ \ | | /| / /  / /| | / /_/ / /|_/ /
 ___/ / | |/ |/ /  / ___ |/ _, _/ /  / /
/____/  |__/|__/  /_/  |_/_/ |_/_/  /_/
                                           "#;

    println!("{}", banner.cyan());
    println!("{}", "  Pool Daemon".bright_black());
    println!("{}", "  https://swarmpool.eth.limo".bright_black());
    println!();
}
