//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use crate::infrastructure::discord::gateway::{
    GATEWAY_URL, LARGE_THRESHOLD, MAX_RECONNECT_ATTEMPTS, MIN_SHARD_SPAWN_DELAY, ShardConfig,
};

const APP_NAME: &str = "oxishard";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Configuration file contents, overridable from the command line.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Request zlib-stream transport compression.
    #[serde(default)]
    pub compress: bool,

    #[serde(default = "default_large_threshold")]
    pub large_threshold: u16,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Gap between shard starts in a group. Values below 5000 are raised.
    #[serde(default = "default_shard_spawn_delay_ms")]
    pub shard_spawn_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            compress: false,
            large_threshold: default_large_threshold(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            shard_spawn_delay_ms: default_shard_spawn_delay_ms(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn spawn_delay(&self) -> Duration {
        Duration::from_millis(self.shard_spawn_delay_ms).max(MIN_SHARD_SPAWN_DELAY)
    }

    /// Per-shard runner settings derived from this section.
    #[must_use]
    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig::new()
            .with_gateway_url(self.url.clone())
            .with_compression(self.compress)
            .with_auto_reconnect(self.auto_reconnect)
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
    }
}

fn default_gateway_url() -> String {
    GATEWAY_URL.to_string()
}

const fn default_large_threshold() -> u16 {
    LARGE_THRESHOLD
}

const fn default_true() -> bool {
    true
}

const fn default_max_reconnect_attempts() -> u32 {
    MAX_RECONNECT_ATTEMPTS
}

const fn default_shard_spawn_delay_ms() -> u64 {
    5000
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }
}
