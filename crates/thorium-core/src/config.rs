//! Configuration resolution for Thorium.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/thorium/settings.json) or an explicit file
//! 3. Environment variables (`THORIUM_*`)
//! 4. CLI arguments (applied by each binary, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Thorium configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Master coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub listen_addr: String,
    pub database_path: Option<PathBuf>,
    /// PEM-encoded ECDSA P-256 private key used to sign tokens.
    pub private_key_path: Option<PathBuf>,
    /// PEM-encoded public key paired with `private_key_path`.
    pub public_key_path: Option<PathBuf>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6960".to_string(),
            database_path: None,
            private_key_path: None,
            public_key_path: None,
        }
    }
}

/// Session expiry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a session entry, refreshed only when the token is re-issued.
    pub expire_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { expire_secs: 300 }
    }
}

/// Game scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Provisioning records older than this are considered stuck.
    pub provision_stale_secs: u64,
    /// Machines without a heartbeat for this long are skipped.
    pub machine_stale_secs: u64,
    /// Timeout for outbound calls to worker machines.
    pub worker_timeout_secs: u64,
    pub default_max_players: u32,
    pub max_players_cap: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            provision_stale_secs: 60,
            machine_stale_secs: 30,
            worker_timeout_secs: 10,
            default_max_players: 16,
            max_players_cap: 64,
        }
    }
}

/// Worker host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub master_url: String,
    pub service_port: u16,
    pub gameserver_binary: PathBuf,
    pub base_listen_port: u16,
    pub max_processes: usize,
    pub heartbeat_interval_secs: u64,
    /// Link speed that `networkUsagePct` is measured against.
    pub network_capacity_mbps: u64,
    /// Timeout for each call to the master.
    pub master_timeout_secs: u64,
    /// Grace period between SIGINT and kill when stopping a game server.
    pub terminate_timeout_secs: u64,
    pub log_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            master_url: "http://127.0.0.1:6960".to_string(),
            service_port: 6961,
            gameserver_binary: PathBuf::from("gameserver"),
            base_listen_port: 10100,
            max_processes: 32,
            heartbeat_interval_secs: 2,
            network_capacity_mbps: 1000,
            master_timeout_secs: 5,
            terminate_timeout_secs: 5,
            log_dir: std::env::temp_dir().join("thorium"),
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("thorium").join("settings.json"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".thorium").join("settings.json"))
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("THORIUM_LISTEN_ADDR") {
        config.master.listen_addr = val;
    }
    if let Some(n) = env_parse("THORIUM_SESSION_EXPIRE_SECS") {
        config.sessions.expire_secs = n;
    }
    if let Some(n) = env_parse("THORIUM_PROVISION_STALE_SECS") {
        config.scheduler.provision_stale_secs = n;
    }
    if let Some(n) = env_parse("THORIUM_MACHINE_STALE_SECS") {
        config.scheduler.machine_stale_secs = n;
    }
    if let Some(n) = env_parse("THORIUM_WORKER_TIMEOUT_SECS") {
        config.scheduler.worker_timeout_secs = n;
    }
    if let Ok(val) = std::env::var("THORIUM_MASTER_URL") {
        config.host.master_url = val;
    }
    if let Ok(val) = std::env::var("THORIUM_GAMESERVER_BINARY") {
        config.host.gameserver_binary = PathBuf::from(val);
    }
}
