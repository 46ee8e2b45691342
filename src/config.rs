//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - hyperstore.toml (default configuration)
//! - hyperstore.local.toml (git-ignored local overrides)
//! - Environment variables (HYPERSTORE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # hyperstore.toml
//! [storage]
//! data_dir = "/var/lib/hyperstore"
//! compression = "snappy"
//! lock_timeout_ms = 30000
//!
//! [storage.performance]
//! num_threads = 4
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! HYPERSTORE_STORAGE__DATA_DIR=/custom/path
//! HYPERSTORE_LOGGING__FORMAT=json
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all array-set stores
    pub data_dir: PathBuf,

    /// Compression for attribute and sort-index column files
    #[serde(default)]
    pub compression: CompressionType,

    /// How long an operation waits for a store lock, in milliseconds.
    /// 0 = wait forever.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Cells per attribute chunk file for newly started arrays
    #[serde(default = "default_chunk_cells")]
    pub chunk_cells: usize,

    /// Performance settings
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Compression options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Snappy compression (fast, good ratio)
    #[default]
    Snappy,
    /// Gzip compression (slower, better ratio)
    Gzip,
    /// No compression
    None,
}

/// Performance tuning options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of worker threads used for sorting large columns
    /// 0 = use all available CPU cores
    #[serde(default)]
    pub num_threads: usize,

    /// Columns with at least this many rows are sorted in parallel
    #[serde(default = "default_parallel_sort_threshold")]
    pub parallel_sort_threshold: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path; empty = stderr
    #[serde(default)]
    pub file: String,
}

// Default value functions
fn default_lock_timeout_ms() -> u64 {
    30_000
}
fn default_chunk_cells() -> usize {
    crate::storage::DEFAULT_CHUNK_CELLS
}
fn default_parallel_sort_threshold() -> usize {
    65_536
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. hyperstore.toml (base configuration)
    /// 2. hyperstore.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (HYPERSTORE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("hyperstore.toml"))
            .merge(Toml::file("hyperstore.local.toml"))
            .merge(Env::prefixed("HYPERSTORE_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HYPERSTORE_").split("__"))
            .extract()
    }

    /// Configuration rooted at `data_dir`, everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.into();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
            compression: CompressionType::Snappy,
            lock_timeout_ms: default_lock_timeout_ms(),
            chunk_cells: default_chunk_cells(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            num_threads: 0, // 0 = use all available CPU cores
            parallel_sort_threshold: default_parallel_sort_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.storage.compression, CompressionType::Snappy);
        assert_eq!(config.storage.lock_timeout_ms, 30_000);
        assert_eq!(config.storage.chunk_cells, 65_536);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[storage.performance]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_default_logging_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.logging.file.is_empty());
    }

    #[test]
    fn test_default_performance_config() {
        let perf = PerformanceConfig::default();
        assert_eq!(perf.num_threads, 0);
        assert_eq!(perf.parallel_sort_threshold, 65_536);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::with_data_dir("/tmp/arrays");
        let toml_str = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.storage.data_dir, PathBuf::from("/tmp/arrays"));
        assert_eq!(back.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let back: Config = toml::from_str("[storage]\ndata_dir = \"/srv\"\n").unwrap();
        assert_eq!(back.storage.compression, CompressionType::Snappy);
        assert_eq!(back.storage.performance.parallel_sort_threshold, 65_536);
        assert_eq!(back.logging.format, "text");
    }

    #[test]
    fn test_compression_type_serde() {
        let json = serde_json::to_string(&CompressionType::Snappy).unwrap();
        assert_eq!(json, "\"snappy\"");
        let json = serde_json::to_string(&CompressionType::Gzip).unwrap();
        assert_eq!(json, "\"gzip\"");
        let json = serde_json::to_string(&CompressionType::None).unwrap();
        assert_eq!(json, "\"none\"");
    }
}
