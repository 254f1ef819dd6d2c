//! Configuration management for Lumen.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Every knob the aggregation core needs
//! (discovery limit, feed batching, retry budgets) is caller-supplied
//! through this structure.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/lumen/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage settings
    pub storage: StorageConfig,
    /// Deep-scan discovery settings
    pub deep_scan: DeepScanConfig,
    /// Feed expansion settings
    pub feed: FeedConfig,
    /// Retry budgets per call site
    pub retry: RetryConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `LUMEN_DISCOVERY_LIMIT`: Override the deep-scan discovery limit
    /// - `LUMEN_FEED_BATCH_SIZE`: Override the feed batch size
    /// - `LUMEN_FEED_CONCURRENCY`: Override the concurrent batch limit
    /// - `LUMEN_DATABASE_PATH`: Override the database location
    /// - `LUMEN_LOG`: Override the tracing filter
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LUMEN_DISCOVERY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.deep_scan.discovery_limit = limit;
                tracing::debug!("Override deep_scan.discovery_limit from env: {}", limit);
            }
        }

        if let Ok(val) = std::env::var("LUMEN_FEED_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                self.feed.batch_size = size;
                tracing::debug!("Override feed.batch_size from env: {}", size);
            }
        }

        if let Ok(val) = std::env::var("LUMEN_FEED_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.feed.max_concurrent_batches = concurrency;
                tracing::debug!(
                    "Override feed.max_concurrent_batches from env: {}",
                    concurrency
                );
            }
        }

        if let Ok(val) = std::env::var("LUMEN_DATABASE_PATH") {
            tracing::debug!("Override storage.database_path from env: {}", val);
            self.storage.database_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("LUMEN_LOG") {
            self.logging.filter = val;
        }
    }

    /// Reject values the coordinators cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.feed.batch_size == 0 {
            return Err(invalid("feed.batch_size", "must be greater than zero"));
        }
        if self.feed.max_concurrent_batches == 0 {
            return Err(invalid(
                "feed.max_concurrent_batches",
                "must be greater than zero",
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(invalid(
                "storage.max_connections",
                "must be greater than zero",
            ));
        }

        for (name, policy) in self.retry.named() {
            if policy.max_attempts == 0 {
                return Err(invalid(
                    &format!("retry.{name}.max_attempts"),
                    "must be at least 1",
                ));
            }
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/lumen/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "lumen", "lumen").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/lumen`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "lumen", "lumen").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the database file, defaulting to `<data_dir>/lumen.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("lumen.db")),
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; `None` uses the XDG data directory
    pub database_path: Option<PathBuf>,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: 5,
        }
    }
}

/// Deep-scan discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepScanConfig {
    /// Maximum number of known pages per scan group
    pub discovery_limit: usize,
}

impl Default for DeepScanConfig {
    fn default() -> Self {
        Self {
            discovery_limit: 100,
        }
    }
}

/// Feed expansion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Requests per submitted batch
    pub batch_size: usize,
    /// Batches submitted concurrently
    pub max_concurrent_batches: usize,
    /// Priority assigned to discovered pages
    pub priority: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_concurrent_batches: 5,
            priority: 0,
        }
    }
}

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl RetryPolicyConfig {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// The delay as a `Duration`.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Retry budgets, kept distinct per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Coordinator-level aggregate updates
    pub aggregate_update: RetryPolicyConfig,
    /// Whole consolidation sequence
    pub consolidation: RetryPolicyConfig,
    /// Combined-results merge (conditional blob write)
    pub combined_results: RetryPolicyConfig,
    /// Whole feed expansion
    pub feed_expansion: RetryPolicyConfig,
    /// Internal optimistic-concurrency loop of a single aggregate merge
    pub document_merge: RetryPolicyConfig,
}

impl RetryConfig {
    fn named(&self) -> [(&'static str, RetryPolicyConfig); 5] {
        [
            ("aggregate_update", self.aggregate_update),
            ("consolidation", self.consolidation),
            ("combined_results", self.combined_results),
            ("feed_expansion", self.feed_expansion),
            ("document_merge", self.document_merge),
        ]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            aggregate_update: RetryPolicyConfig::new(2, 1000),
            consolidation: RetryPolicyConfig::new(2, 1000),
            combined_results: RetryPolicyConfig::new(5, 500),
            feed_expansion: RetryPolicyConfig::new(5, 500),
            document_merge: RetryPolicyConfig::new(5, 50),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Include the event target in formatted output
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,lumen=debug".to_string(),
            with_target: true,
        }
    }
}
