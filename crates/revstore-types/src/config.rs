//! Configuration loading for revstore.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/revstore/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// Values were read but are out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Watch pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Delay between event log polls (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Trailing window re-scanned on every poll, also the dedup TTL (s).
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,

    /// Capacity of each watcher's output channel.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_lookback_secs() -> u64 {
    30
}

fn default_buffer_size() -> usize {
    10_000
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lookback_secs: default_lookback_secs(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl NotifierSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lookback_period(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("notifier.poll_interval_ms must be > 0".to_string());
        }
        if self.buffer_size == 0 {
            return Err("notifier.buffer_size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Garbage collection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcSettings {
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,

    /// Count what would be reclaimed without deleting anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Delay between collection runs (s).
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,

    /// Rows examined per batch call.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: usize,

    /// Default history retention (s).
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Retention for dashboards (s).
    #[serde(default = "default_dashboards_max_age_secs")]
    pub dashboards_max_age_secs: u64,

    /// Retention for change notifications in the event log (s).
    #[serde(default = "default_event_retention_secs")]
    pub event_retention_secs: u64,
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_interval_secs() -> u64 {
    15 * 60
}

fn default_gc_batch_size() -> usize {
    1000
}

fn default_max_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_dashboards_max_age_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_event_retention_secs() -> u64 {
    60 * 60
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            dry_run: false,
            interval_secs: default_gc_interval_secs(),
            batch_size: default_gc_batch_size(),
            max_age_secs: default_max_age_secs(),
            dashboards_max_age_secs: default_dashboards_max_age_secs(),
            event_retention_secs: default_event_retention_secs(),
        }
    }
}

impl GcSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn dashboards_max_age(&self) -> Duration {
        Duration::from_secs(self.dashboards_max_age_secs)
    }

    pub fn event_retention(&self) -> Duration {
        Duration::from_secs(self.event_retention_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("gc.batch_size must be > 0".to_string());
        }
        if self.interval_secs == 0 {
            return Err("gc.interval_secs must be > 0".to_string());
        }
        if self.dashboards_max_age_secs < self.max_age_secs {
            return Err(format!(
                "gc.dashboards_max_age_secs ({}) must not be shorter than gc.max_age_secs ({})",
                self.dashboards_max_age_secs, self.max_age_secs
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Node component of minted resource versions (0-1023).
    /// Random per process when unset.
    #[serde(default)]
    pub node_id: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub notifier: NotifierSettings,

    #[serde(default)]
    pub gc: GcSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "revstore")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            node_id: None,
            log_level: default_log_level(),
            notifier: NotifierSettings::default(),
            gc: GcSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (<config dir>/revstore/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REVSTORE_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "revstore")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::load_from(&config_dir, cli_config_path)
    }

    /// Same as `load`, reading the default config file from `config_dir`.
    pub fn load_from(
        config_dir: &Path,
        cli_config_path: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: REVSTORE_DB_PATH, REVSTORE_GC__BATCH_SIZE, ...
        builder = builder.add_source(
            Environment::with_prefix("REVSTORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(node_id) = self.node_id {
            if node_id > 1023 {
                return Err(ConfigError::Invalid(format!(
                    "node_id must be 0-1023, got {}",
                    node_id
                )));
            }
        }
        self.notifier.validate().map_err(ConfigError::Invalid)?;
        self.gc.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Expand ~ in db_path to actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
