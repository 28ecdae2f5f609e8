//! Configuration loader
//!
//! Builds a [`Config`] in layers, later layers overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. a config file (JSON or TOML), if one is found
//! 3. `FARMGATE_*` environment variables
//!
//! The result is validated before it is returned.
//!
//! ## Environment Variables
//! - `FARMGATE_BATCH_MAX_RETRIES`: attempts per batch item
//! - `FARMGATE_BATCH_RETRY_DELAY_MS`: initial backoff delay
//! - `FARMGATE_BATCH_CONCURRENCY_LIMIT`: items in flight per batch
//! - `FARMGATE_BREAKER_THRESHOLD`: failures that open a circuit
//! - `FARMGATE_BREAKER_TIMEOUT_MS`: cooldown before a trial call
//! - `FARMGATE_METRICS_RETENTION_SECS`: maximum sample age
//! - `FARMGATE_METRICS_MAX_SAMPLES`: per-series sample cap
//! - `FARMGATE_LOG_FILTER`: `EnvFilter` directive
//! - `FARMGATE_LOG_JSON`: JSON log output (true/false)
//! - `FARMGATE_LOG_DIR`: directory for rolling log files
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./farmgate.{toml,json}` then `./config.{toml,json}`
//! 2. the same names in the parent and grandparent directories
//! 3. the same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use farmgate_domain::{Config, FarmgateError, Result};

const FILE_NAMES: &[&str] = &["farmgate.toml", "farmgate.json", "config.toml", "config.json"];

/// Load configuration from defaults, an optional file and the environment
///
/// # Errors
/// Returns `FarmgateError::Config` if a found file cannot be parsed, an
/// environment variable has an invalid value, or the merged configuration
/// fails validation.
pub fn load() -> Result<Config> {
    let mut config = match probe_config_paths() {
        Some(path) => read_file(&path)?,
        None => {
            tracing::debug!("No config file found, starting from defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    tracing::info!(
        concurrency_limit = config.batch.concurrency_limit,
        max_retries = config.batch.max_retries,
        "Configuration loaded"
    );
    Ok(config)
}

/// Load configuration from defaults and environment variables only
///
/// # Errors
/// Returns `FarmgateError::Config` if a variable has an invalid value or the
/// result fails validation.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by extension. Environment variables are not applied.
///
/// # Errors
/// Returns `FarmgateError::Config` if no file is found, the format is
/// invalid, or the result fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FarmgateError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FarmgateError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    let config = read_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

/// Override `config` fields from `FARMGATE_*` variables that are set
///
/// # Errors
/// Returns `FarmgateError::Config` naming the variable if a value does not
/// parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(value) = env_parse("FARMGATE_BATCH_MAX_RETRIES")? {
        config.batch.max_retries = value;
    }
    if let Some(value) = env_parse("FARMGATE_BATCH_RETRY_DELAY_MS")? {
        config.batch.retry_delay_ms = value;
    }
    if let Some(value) = env_parse("FARMGATE_BATCH_CONCURRENCY_LIMIT")? {
        config.batch.concurrency_limit = value;
    }
    if let Some(value) = env_parse("FARMGATE_BREAKER_THRESHOLD")? {
        config.batch.circuit_breaker_threshold = value;
    }
    if let Some(value) = env_parse("FARMGATE_BREAKER_TIMEOUT_MS")? {
        config.batch.circuit_breaker_timeout_ms = value;
    }
    if let Some(value) = env_parse("FARMGATE_METRICS_RETENTION_SECS")? {
        config.metrics.retention_secs = value;
    }
    if let Some(value) = env_parse("FARMGATE_METRICS_MAX_SAMPLES")? {
        config.metrics.max_samples_per_series = value;
    }
    if let Some(filter) = env_string("FARMGATE_LOG_FILTER") {
        config.logging.filter = filter;
    }
    if let Some(json) = env_flag("FARMGATE_LOG_JSON") {
        config.logging.json = json;
    }
    if let Some(dir) = env_string("FARMGATE_LOG_DIR") {
        config.logging.directory = Some(PathBuf::from(dir));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Config> {
    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| FarmgateError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration by file extension (`.json` or `.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FarmgateError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FarmgateError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(FarmgateError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.is_file())
}

/// Non-empty value of `key`
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parsed value of `key`, `None` when unset
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| FarmgateError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Boolean flag; accepts `1`/`true`/`yes`/`on` as true (case-insensitive)
fn env_flag(key: &str) -> Option<bool> {
    env_string(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
