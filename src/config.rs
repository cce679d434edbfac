use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "SEARCH_HISTORY_";

/// Upper bound for day-based windows; larger values are rejected at load time.
pub const MAX_DAYS: u64 = 3650;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Whole days as a `Duration`, saturating instead of overflowing.
pub fn days(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(SECS_PER_DAY))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(version, about = "Search history service with a cached popularity view")]
pub struct Args {
    /// Optional TOML file layered under the environment
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,

    pub port: u16,

    pub log_level: String,

    /// How long background tasks get to wind down after a shutdown signal.
    pub shutdown_timeout_secs: u64,

    pub cache: CacheConfig,

    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of popularity entries held in memory.
    pub capacity: usize,

    /// Trailing window, in days, that popularity is aggregated over.
    pub window_days: u64,

    pub refresh_interval_secs: u64,

    /// Snapshot age past which a read schedules a refresh.
    pub stale_threshold_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub retention_days: u64,

    pub purge_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            log_level: "info".to_string(),
            shutdown_timeout_secs: 10,
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            window_days: 7,
            refresh_interval_secs: 60,
            stale_threshold_secs: 70,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention_days: 14,
            purge_interval_secs: 60 * 60,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `SEARCH_HISTORY_*` variables.
    /// Nested keys use `__`, e.g. `SEARCH_HISTORY_CACHE__CAPACITY=50`.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be at least 1");
        }
        if self.cache.window_days == 0 {
            bail!("cache.window_days must be at least 1");
        }
        if self.cache.window_days > MAX_DAYS {
            bail!("cache.window_days must be at most {MAX_DAYS}");
        }
        if self.cache.refresh_interval_secs == 0 {
            bail!("cache.refresh_interval_secs must be at least 1");
        }
        if self.cache.stale_threshold_secs == 0 {
            bail!("cache.stale_threshold_secs must be at least 1");
        }
        if self.storage.retention_days == 0 {
            bail!("storage.retention_days must be at least 1");
        }
        if self.storage.retention_days > MAX_DAYS {
            bail!("storage.retention_days must be at most {MAX_DAYS}");
        }
        if self.storage.purge_interval_secs == 0 {
            bail!("storage.purge_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        days(self.retention_days)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}
