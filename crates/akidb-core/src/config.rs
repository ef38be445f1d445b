//! Configuration management for the collection catalog
//!
//! This module provides a centralized configuration system that supports:
//! - YAML/TOML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for the catalog engine
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Upper bound on a whole `list` call, in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl CatalogConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by AKIDB_CATALOG_CONFIG env var
    /// 3. ./config/catalog.{yaml,toml}
    /// 4. /etc/akidb/catalog.{yaml,toml}
    /// 5. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("AKIDB_CATALOG_CONFIG").ok();
        Self::load_layered(&Self::file_sources(explicit.as_deref()))
    }

    /// Config files in increasing precedence.
    fn file_sources(explicit: Option<&str>) -> Vec<String> {
        let mut files = vec![
            "/etc/akidb/catalog".to_string(),
            "./config/catalog".to_string(),
        ];
        files.extend(explicit.map(str::to_string));
        files
    }

    /// Defaults, then each of `files` (later ones override earlier ones), then
    /// environment variables.
    fn load_layered(files: &[String]) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        for file in files {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        // Example: AKIDB_CATALOG__PAGINATION__SIMPLE_THRESHOLD=5000
        builder = builder.add_source(
            Environment::with_prefix("AKIDB_CATALOG")
                .separator("__")
                .try_parsing(true),
        );

        let config: CatalogConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let pagination = PaginationConfig::default();
        let fanout = FanoutConfig::default();
        let retry = RetryConfig::default();
        let cache = CacheConfig::default();

        builder
            // Pagination
            .set_default("pagination.simple_threshold", pagination.simple_threshold)?
            .set_default("pagination.max_page_size", pagination.max_page_size as u64)?
            .set_default("pagination.batch_multiplier", pagination.batch_multiplier as u64)?
            .set_default("pagination.drain_batch_size", pagination.drain_batch_size as u64)?
            .set_default(
                "pagination.max_seen_per_repository",
                pagination.max_seen_per_repository as u64,
            )?
            .set_default("pagination.max_token_bytes", pagination.max_token_bytes as u64)?
            .set_default(
                "pagination.max_partition_failures",
                pagination.max_partition_failures,
            )?
            // Fan-out
            .set_default("fanout.concurrency", fanout.concurrency as u64)?
            .set_default("fanout.partition_timeout_ms", fanout.partition_timeout_ms)?
            // Retry
            .set_default("retry.max_attempts", retry.max_attempts)?
            .set_default("retry.initial_backoff_ms", retry.initial_backoff_ms)?
            .set_default("retry.max_backoff_ms", retry.max_backoff_ms)?
            .set_default("retry.backoff_multiplier", retry.backoff_multiplier)?
            .set_default("retry.jitter_percent", retry.jitter_percent)?
            // Cache
            .set_default("cache.enabled", cache.enabled)?
            .set_default("cache.ttl_secs", cache.ttl_secs)?
            .set_default("cache.max_entries", cache.max_entries)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.max_page_size == 0 {
            return Err(ConfigError::Message(
                "pagination.max_page_size must be > 0".to_string(),
            ));
        }

        if self.pagination.batch_multiplier == 0 {
            return Err(ConfigError::Message(
                "pagination.batch_multiplier must be > 0".to_string(),
            ));
        }

        if self.pagination.drain_batch_size == 0 {
            return Err(ConfigError::Message(
                "pagination.drain_batch_size must be > 0".to_string(),
            ));
        }

        let max_batch = self.pagination.batch_size(self.pagination.max_page_size);
        if self.pagination.max_seen_per_repository < max_batch {
            return Err(ConfigError::Message(
                "pagination.max_seen_per_repository must cover one batch at max_page_size"
                    .to_string(),
            ));
        }

        if self.pagination.max_partition_failures == 0 {
            return Err(ConfigError::Message(
                "pagination.max_partition_failures must be > 0".to_string(),
            ));
        }

        if self.fanout.concurrency == 0 {
            return Err(ConfigError::Message(
                "fanout.concurrency must be > 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_percent) {
            return Err(ConfigError::Message(
                "retry.jitter_percent must be within [0.0, 1.0]".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: CatalogConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Whole-call deadline, if configured
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Pagination strategy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Estimated corpus size at or above which the cursor-merge strategy is used
    pub simple_threshold: u64,

    /// Largest page a caller may request
    pub max_page_size: usize,

    /// Scalable strategy fetches `page_size * batch_multiplier` items per repository
    pub batch_multiplier: usize,

    /// Page size used when the simple strategy drains a repository
    pub drain_batch_size: usize,

    /// Cap on remembered collection ids per repository in a cursor token
    pub max_seen_per_repository: usize,

    /// Tokens longer than this are treated as invalid
    pub max_token_bytes: usize,

    /// Consecutive failed calls after which a repository is given up on for
    /// the rest of a cursor-paginated sequence
    pub max_partition_failures: u32,
}

impl PaginationConfig {
    /// Per-repository batch size for the cursor-merge strategy
    pub fn batch_size(&self, page_size: usize) -> usize {
        page_size.saturating_mul(self.batch_multiplier).max(page_size)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            simple_threshold: 1000,
            max_page_size: 1000,
            batch_multiplier: 2,
            drain_batch_size: 500,
            max_seen_per_repository: 4096,
            max_token_bytes: 256 * 1024,
            max_partition_failures: 3,
        }
    }
}

/// Partition fan-out configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Maximum concurrent repository queries
    pub concurrency: usize,

    /// Per-call timeout for a single repository query, in milliseconds
    pub partition_timeout_ms: u64,
}

impl FanoutConfig {
    pub fn partition_timeout(&self) -> Duration {
        Duration::from_millis(self.partition_timeout_ms)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            partition_timeout_ms: 5000,
        }
    }
}

/// Retry configuration for repository queries
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Jitter percentage (0.0 - 1.0)
    pub jitter_percent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_percent: 0.2,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff delay for a given retry attempt (0-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Registry/count cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 30,
            max_entries: 10_000,
        }
    }
}
