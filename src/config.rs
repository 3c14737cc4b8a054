use crate::error::{ExchangeError, Result};
use crate::store::DEFAULT_MAX_TRANSACTION_RETRIES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Deadline for loading, validating and swapping one exchange.
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_transaction_retries: u32,
    pub simulated_latency_ms: Option<u64>,
    /// Random extra delay, up to this many milliseconds, per round trip.
    pub simulated_jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 90,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_transaction_retries: DEFAULT_MAX_TRANSACTION_RETRIES,
            simulated_latency_ms: None,
            simulated_jitter_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Some("pretty".to_string()),
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExchangeError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| ExchangeError::Config(format!("Cannot parse {}: {}", path.display(), e)))
    }

    /// Loads `path`, first writing the default configuration there if the
    /// file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            create_default_config_file(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }
        Self::load(path)
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("TRADEPOST_STORE_BACKEND") {
            self.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                other => {
                    return Err(ExchangeError::Config(format!("Unknown store backend: {}", other)))
                }
            };
        }

        if let Ok(url) = std::env::var("TRADEPOST_STORE_URL") {
            self.store.url = Some(url);
        }

        if let Ok(timeout) = std::env::var("TRADEPOST_EXCHANGE_TIMEOUT_SECONDS") {
            self.exchange.timeout_seconds = timeout.parse().map_err(|e| {
                ExchangeError::Config(format!("Invalid TRADEPOST_EXCHANGE_TIMEOUT_SECONDS: {}", e))
            })?;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.timeout_seconds == 0 {
            return Err(ExchangeError::Config("Exchange timeout cannot be 0".to_string()));
        }

        if self.store.max_transaction_retries == 0 {
            return Err(ExchangeError::Config(
                "Store transaction retries cannot be 0".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Sqlite
            && self.store.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(ExchangeError::Config(
                "Sqlite store needs a database url".to_string(),
            ));
        }

        if let Some(format) = self.logging.format.as_deref() {
            if format != "pretty" && format != "json" {
                return Err(ExchangeError::Config(format!("Unknown log format: {}", format)));
            }
        }

        Ok(())
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let rendered = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ExchangeError::Config(format!("Cannot render default configuration: {}", e)))?;
    std::fs::write(path, rendered)?;
    Ok(())
}
