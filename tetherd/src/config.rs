//! `tether.toml` loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_plugin_host::ResourceLimits;
use tether_sync::SyncConfig;
use tracing::info;

/// Daemon configuration. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Directory scanned for consumer plugins.
    pub plugin_dir: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    pub sync: SyncConfig,
    pub sandbox: ResourceLimits,
    pub http: HttpConfig,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("plugins"),
            database_path: PathBuf::from("tether.db"),
            sync: SyncConfig::default(),
            sandbox: ResourceLimits::default(),
            http: HttpConfig::default(),
        }
    }
}

impl TetherConfig {
    /// Reads `path`. A missing file yields the defaults; a malformed one is
    /// an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// The `[http]` section: the client consumers fetch through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("tether/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .user_agent(&self.user_agent)
            .build()
            .context("building HTTP client")
    }
}
