//! Configuration loader
//!
//! Loads [`BulkheadSettings`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `BULKHEAD_CAPACITY` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `BULKHEAD_CAPACITY`: Default gate capacity (required)
//! - `BULKHEAD_TIMEOUT`: Default admission timeout, in milliseconds or with
//!   a unit suffix (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./bulkhead.toml` or `./bulkhead.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//!
//! Files keep the settings under a top-level `bulkhead` key.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{parse_duration, BulkheadSettings, GateConfig};
use crate::error::{GateError, GateResult};

/// Environment variable holding the default capacity
pub const ENV_CAPACITY: &str = "BULKHEAD_CAPACITY";
/// Environment variable holding the default admission timeout
pub const ENV_TIMEOUT: &str = "BULKHEAD_TIMEOUT";

const CONFIG_FILE_NAMES: [&str; 4] = ["bulkhead.toml", "bulkhead.json", "config.toml", "config.json"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    bulkhead: BulkheadSettings,
}

/// Load settings with automatic fallback strategy
///
/// First attempts to load from environment variables. If `BULKHEAD_CAPACITY`
/// is not set, falls back to probing for a config file from the current
/// working directory. A variable that is set but invalid is an error.
///
/// # Errors
/// Returns `GateError::Config` if:
/// - An environment variable is set to an invalid value
/// - No config file is found when the environment is not set
/// - File format is invalid
/// - A configured capacity is not positive
pub fn load() -> GateResult<BulkheadSettings> {
    let cwd = std::env::current_dir()
        .map_err(|e| GateError::config(format!("Failed to read working directory: {e}")))?;
    load_with(|key| std::env::var(key).ok(), &cwd)
}

/// Same as [`load`], with an injectable variable lookup and probe base
///
/// # Errors
/// Same as [`load`].
pub fn load_with<F>(lookup: F, base: &Path) -> GateResult<BulkheadSettings>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(settings) = env_settings(&lookup)? {
        tracing::info!("Bulkhead configuration loaded from environment variables");
        return Ok(settings);
    }

    tracing::debug!(variable = ENV_CAPACITY, "Environment variable not set, trying file");
    let path = probe_from(base).ok_or_else(|| {
        GateError::config("No config file found in any of the standard locations")
    })?;
    load_from_file(Some(path))
}

/// Load settings from the process environment
///
/// # Errors
/// Returns `GateError::Config` if `BULKHEAD_CAPACITY` is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> GateResult<BulkheadSettings> {
    load_from_env_with(|key| std::env::var(key).ok())
}

/// Load settings through an arbitrary variable lookup
///
/// # Errors
/// Same as [`load_from_env`].
pub fn load_from_env_with<F>(lookup: F) -> GateResult<BulkheadSettings>
where
    F: Fn(&str) -> Option<String>,
{
    env_settings(&lookup)?.ok_or_else(|| {
        GateError::config(format!("Missing environment variable: {ENV_CAPACITY}"))
    })
}

/// `Ok(None)` when `BULKHEAD_CAPACITY` is not set at all
fn env_settings<F>(lookup: &F) -> GateResult<Option<BulkheadSettings>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(ENV_CAPACITY) else {
        return Ok(None);
    };
    let capacity = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| GateError::config(format!("Invalid capacity: {e}")))?;

    let timeout = match lookup(ENV_TIMEOUT) {
        Some(raw) => parse_duration(&raw).map_err(GateError::config)?,
        None => GateConfig::default().timeout,
    };

    let settings = BulkheadSettings::new(GateConfig { capacity, timeout });
    settings.validate()?;
    Ok(Some(settings))
}

/// Load settings from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `GateError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A configured capacity is not positive
pub fn load_from_file(path: Option<PathBuf>) -> GateResult<BulkheadSettings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(GateError::config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            GateError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading bulkhead configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| GateError::config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse settings from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `GateError::Config` if the format is unsupported, parsing fails
/// or the parsed settings are invalid.
pub fn parse_config(contents: &str, path: &Path) -> GateResult<BulkheadSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let file: ConfigFile = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| GateError::config(format!("Invalid TOML format: {e}")))?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| GateError::config(format!("Invalid JSON format: {e}")))?,
        _ => return Err(GateError::config(format!("Unsupported config format: {extension}"))),
    };

    file.bulkhead.validate()?;
    Ok(file.bulkhead)
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    probe_from(&cwd)
}

fn probe_from(base: &Path) -> Option<PathBuf> {
    base.ancestors()
        .take(3)
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}
