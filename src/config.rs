//! Configuration management for the pool daemon.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon configuration, recognized options passed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pool identity, used as topic namespace and signed into snapshots.
    pub pool_ens: String,

    /// Signing key for outgoing state/epoch snapshots. Never serialized back
    /// out in plaintext debug dumps beyond what the operator already holds.
    pub operator_private_key: Option<String>,

    /// Seal cadence in seconds.
    pub epoch_duration_seconds: u64,

    /// Claim reclamation horizon in seconds.
    pub claim_timeout_seconds: u64,

    /// Heartbeat staleness threshold for the offline transition, in seconds.
    pub miner_timeout_seconds: u64,

    /// Address of the content-store adapter.
    pub content_store_api: String,

    /// Address of the durable sidecar.
    pub sidecar_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_ens: "swarmpool.eth".to_string(),
            operator_private_key: None,
            epoch_duration_seconds: 3600,
            claim_timeout_seconds: 300,
            miner_timeout_seconds: 120,
            content_store_api: "http://localhost:5001".to_string(),
            sidecar_url: "redis://localhost:6379".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Get the config file path (`~/.config/eth.swarmpool.swarm-poold/config.toml` or platform
/// equivalent).
pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("eth", "swarmpool", "swarm-poold")
        .context("Failed to determine config directory")?;

    let config_dir = proj_dirs.config_dir();
    std::fs::create_dir_all(config_dir)?;

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file, falling back to defaults if none exists.
pub fn load_config() -> Result<Config> {
    let path = get_config_path()?;

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

    let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

    Ok(config)
}

/// Save configuration to file.
pub fn save_config(config: &Config) -> Result<()> {
    let path = get_config_path()?;

    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    std::fs::write(&path, content).context("Failed to write config file")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.epoch_duration_seconds, 3600);
        assert_eq!(config.claim_timeout_seconds, 300);
        assert_eq!(config.miner_timeout_seconds, 120);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.pool_ens, config.pool_ens);
        assert_eq!(parsed.epoch_duration_seconds, config.epoch_duration_seconds);
    }
}
