//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/rgate.sqlite"
//! max_connections = 5
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [api]
//! enabled = true
//! authentication = true
//!
//! [queue]
//! capacity = 1000
//!
//! [deletes]
//! interval_secs = 10
//!
//! [audit]
//! path = "./logs/api.log"
//! ```
//!
//! Only `[db]` and `[server]` are required. The API is off by default and
//! authentication is on by default.

use anyhow::{Context, Result};
use repo_gate_core::ApiSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub deletes: DeletesConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_authentication")]
    pub authentication: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            authentication: true,
        }
    }
}

fn default_authentication() -> bool {
    true
}

impl ApiConfig {
    pub fn settings(&self) -> ApiSettings {
        ApiSettings {
            enabled: self.enabled,
            authentication: self.authentication,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeletesConfig {
    #[serde(default = "default_delete_interval")]
    pub interval_secs: u64,
}

impl Default for DeletesConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_delete_interval(),
        }
    }
}

fn default_delete_interval() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuditConfig {
    /// Append audit lines to this file. Without it they go to `tracing`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }
    if config.queue.capacity == 0 {
        anyhow::bail!("queue.capacity must be > 0");
    }
    if config.deletes.interval_secs == 0 {
        anyhow::bail!("deletes.interval_secs must be > 0");
    }
    Ok(())
}
