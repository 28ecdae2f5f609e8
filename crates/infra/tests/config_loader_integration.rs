//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;
use std::path::PathBuf;

use farmgate_domain::FarmgateError;
use farmgate_infra::config;
use tempfile::{NamedTempFile, TempPath};

fn write_config(contents: &str, suffix: &str) -> TempPath {
    let mut file = tempfile::Builder::new()
        .prefix("farmgate-it")
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file.into_temp_path()
}

#[test]
fn test_load_config_from_json_file() {
    let json_content = r#"{
        "batch": {
            "max_retries": 5,
            "retry_delay_ms": 250,
            "concurrency_limit": 12,
            "circuit_breaker_threshold": 3,
            "circuit_breaker_timeout_ms": 15000
        },
        "metrics": {
            "retention_secs": 600,
            "max_samples_per_series": 500
        },
        "logging": {
            "filter": "farmgate=debug",
            "json": true
        }
    }"#;
    let path = write_config(json_content, ".json");

    let config = config::load_from_file(Some(PathBuf::from(&*path)))
        .expect("Failed to load config from JSON file");

    assert_eq!(config.batch.max_retries, 5);
    assert_eq!(config.batch.retry_delay_ms, 250);
    assert_eq!(config.batch.concurrency_limit, 12);
    assert_eq!(config.batch.circuit_breaker_threshold, 3);
    assert_eq!(config.batch.circuit_breaker_timeout_ms, 15_000);
    assert_eq!(config.metrics.retention_secs, 600);
    assert_eq!(config.metrics.max_samples_per_series, 500);
    assert_eq!(config.logging.filter, "farmgate=debug");
    assert!(config.logging.json);
}

#[test]
fn test_load_config_from_toml_file() {
    let toml_content = r#"
[batch]
max_retries = 2
backoff_factor = 1.5
jitter = true

[retry]
max_attempts = 6
initial_delay_ms = 20
max_delay_ms = 2000

[logging]
directory = "/var/log/farmgate"
"#;
    let path = write_config(toml_content, ".toml");

    let config = config::load_from_file(Some(PathBuf::from(&*path)))
        .expect("Failed to load config from TOML file");

    assert_eq!(config.batch.max_retries, 2);
    assert_eq!(config.batch.backoff_factor, 1.5);
    assert!(config.batch.jitter);
    assert_eq!(config.retry.max_attempts, 6);
    assert_eq!(config.retry.initial_delay_ms, 20);
    assert_eq!(config.logging.directory, Some(PathBuf::from("/var/log/farmgate")));
}

#[test]
fn test_load_config_with_empty_object_uses_defaults() {
    let path = write_config("{}", ".json");

    let config = config::load_from_file(Some(PathBuf::from(&*path)))
        .expect("Failed to load empty config");

    assert_eq!(config, farmgate_domain::Config::default());
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result = config::load_from_file(Some("/nonexistent/path/farmgate.json".into()));

    match result {
        Err(FarmgateError::Config(msg)) => {
            assert!(msg.contains("not found"), "Error message should mention 'not found'");
        }
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[test]
fn test_load_config_with_invalid_format() {
    let path = write_config(r#"{ "this is": "not valid" "#, ".json");

    match config::load_from_file(Some(PathBuf::from(&*path))) {
        Err(FarmgateError::Config(msg)) => {
            assert!(msg.contains("Invalid JSON"), "Error message should mention invalid JSON");
        }
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[test]
fn test_load_config_rejects_values_failing_validation() {
    let path = write_config("[batch]\nconcurrency_limit = 0\n", ".toml");

    let err = config::load_from_file(Some(PathBuf::from(&*path)))
        .expect_err("zero concurrency must be rejected");

    assert!(err.to_string().contains("concurrency_limit"));
}

#[test]
fn test_load_config_rejects_unknown_extension() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(b"batch:\n  max_retries: 2\n").expect("Failed to write to temp file");
    let path = file.path().with_extension("yaml");
    std::fs::copy(file.path(), &path).expect("Failed to copy file");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    assert!(matches!(result, Err(FarmgateError::Config(msg)) if msg.contains("Unsupported")));
}
