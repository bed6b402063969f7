use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use shared::protocol::{DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_UPDATE_THREAD_NUM};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactorConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Width of the refresh permit pool; zero falls back to the default
    #[serde(default = "default_update_thread_num")]
    pub update_thread_num: usize,
    #[serde(default)]
    pub not_load_cache_at_start: bool,
    /// Whether an empty instance list may replace a cached snapshot
    #[serde(default)]
    pub update_cache_when_empty: bool,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/lib/naming-reactor")
}

fn default_update_thread_num() -> usize {
    DEFAULT_UPDATE_THREAD_NUM
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_base_url() -> String {
    "http://127.0.0.1:8848".to_string()
}

fn default_timeout() -> u64 {
    3000
}

fn default_push_listen() -> String {
    "0.0.0.0:0".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8053".to_string()
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            update_thread_num: default_update_thread_num(),
            not_load_cache_at_start: false,
            update_cache_when_empty: false,
            refresh_interval_ms: default_refresh_interval(),
        }
    }
}

impl ReactorConfig {
    /// Zero falls back to the default; anything above what a semaphore can
    /// hold is clamped.
    pub fn permit_width(&self) -> usize {
        if self.update_thread_num == 0 {
            DEFAULT_UPDATE_THREAD_NUM
        } else {
            self.update_thread_num.min(Semaphore::MAX_PERMITS)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            namespace: String::new(),
            timeout_ms: default_timeout(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            listen: default_push_listen(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}
