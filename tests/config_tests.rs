//! Config loading, TOML parsing, and env var override tests.
//!
//! Env-var tests are `#[ignore]` (they mutate process state and conflict in parallel).
//! Run them with: `cargo test --test config_tests -- --ignored --test-threads=1`

use hyperstore::{ArrayStore, CompressionType, Config};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("hyperstore.toml");
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

// Default Configuration Tests
#[test]
fn test_config_default_storage_path() {
    let config = Config::default();
    assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
}

#[test]
fn test_config_default_compression() {
    let config = Config::default();
    assert_eq!(config.storage.compression, CompressionType::Snappy);
}

#[test]
fn test_config_default_lock_timeout() {
    let config = Config::default();
    assert_eq!(config.storage.lock_timeout_ms, 30_000);
}

#[test]
fn test_config_with_data_dir_keeps_defaults() {
    let config = Config::with_data_dir("/srv/arrays");
    assert_eq!(config.storage.data_dir, PathBuf::from("/srv/arrays"));
    assert_eq!(config.storage.performance.num_threads, 0);
    assert_eq!(config.logging.level, "info");
}

// File Loading Tests
#[test]
fn test_config_from_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        r#"
[storage]
data_dir = "/var/lib/hyperstore"
compression = "gzip"
lock_timeout_ms = 500
chunk_cells = 4096

[storage.performance]
num_threads = 2
parallel_sort_threshold = 1024

[logging]
level = "debug"
format = "json"
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/hyperstore"));
    assert_eq!(config.storage.compression, CompressionType::Gzip);
    assert_eq!(config.storage.lock_timeout_ms, 500);
    assert_eq!(config.storage.chunk_cells, 4096);
    assert_eq!(config.storage.performance.num_threads, 2);
    assert_eq!(config.storage.performance.parallel_sort_threshold, 1024);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_config_partial_file_falls_back_to_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[storage]\ncompression = \"none\"\n");

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.storage.compression, CompressionType::None);
    assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let config = Config::from_file("/nonexistent/hyperstore.toml").unwrap();
    assert_eq!(config.storage.lock_timeout_ms, 30_000);
}

#[test]
fn test_config_invalid_compression_is_error() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[storage]\ncompression = \"lz77\"\n");
    assert!(Config::from_file(&path).is_err());
}

// Store Construction Tests
#[test]
fn test_store_creates_data_dir() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("nested").join("data");
    let store = ArrayStore::new(Config::with_data_dir(&data_dir)).unwrap();
    assert!(data_dir.is_dir());
    assert!(store.list_arraysets().unwrap().is_empty());
}

#[test]
fn test_store_honours_compression() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::with_data_dir(temp.path());
    config.storage.compression = CompressionType::None;
    let store = ArrayStore::new(config).unwrap();
    assert_eq!(store.config().compression, CompressionType::None);
}

// Environment Override Tests
#[test]
#[ignore]
fn test_env_overrides_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[storage]\nlock_timeout_ms = 100\n");

    env::set_var("HYPERSTORE_STORAGE__LOCK_TIMEOUT_MS", "2500");
    env::set_var("HYPERSTORE_LOGGING__FORMAT", "json");
    let config = Config::from_file(&path);
    env::remove_var("HYPERSTORE_STORAGE__LOCK_TIMEOUT_MS");
    env::remove_var("HYPERSTORE_LOGGING__FORMAT");

    let config = config.unwrap();
    assert_eq!(config.storage.lock_timeout_ms, 2500);
    assert_eq!(config.logging.format, "json");
}

#[test]
#[ignore]
fn test_load_reads_working_directory() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, "[storage]\ndata_dir = \"/from/cwd\"\n");

    let previous = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let config = Config::load();
    env::set_current_dir(previous).unwrap();

    assert_eq!(config.unwrap().storage.data_dir, PathBuf::from("/from/cwd"));
}
