use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RysenConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, every lookup is a miss and nothing is stored.
    pub enabled: bool,
    /// `"memory"` (process-local) or `"sqlite"` (shared through the database file).
    pub backend: String,
    pub ttl_hours: u64,
    /// Upper bound for the in-memory backend; ignored by sqlite.
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub reading_model: String,
    pub moderation_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Extra attempts after a version conflict on a pastoral memory record.
    pub max_merge_retries: u32,
}

impl Default for RysenConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_rysen_dir()
            .join("rysen.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "sqlite".into(),
            ttl_hours: 48,
            max_entries: 10_000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            chat_model: "gpt-4o".into(),
            reading_model: "gpt-4-turbo".into(),
            moderation_model: "omni-moderation-latest".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_merge_retries: 2,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Result<Duration> {
        self.ttl_hours
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow::anyhow!("cache.ttl_hours too large: {}", self.ttl_hours))
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns `~/.rysen/`, or `./.rysen/` when no home directory is known.
pub fn default_rysen_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rysen")
}

/// Returns the default config file path: `~/.rysen/config.toml`
pub fn default_config_path() -> PathBuf {
    default_rysen_dir().join("config.toml")
}

impl RysenConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RysenConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (RYSEN_DB, RYSEN_LOG_LEVEL, RYSEN_PORT, RYSEN_LLM_BASE_URL, OPENAI_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RYSEN_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RYSEN_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RYSEN_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid RYSEN_PORT"),
            }
        }
        if let Ok(val) = std::env::var("RYSEN_LLM_BASE_URL") {
            self.llm.base_url = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
