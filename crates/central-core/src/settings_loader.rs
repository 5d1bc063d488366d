//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `CENTRAL_SECRET_KEY` | `secret_key` |
//! | `CENTRAL_RESET_TOKEN_SECRET_KEY` | `reset_token_secret_key` |
//! | `CENTRAL_DEBUG` | `debug` |
//! | `CENTRAL_LOG_LEVEL` | `log_level` |
//! | `CENTRAL_TOKEN_EXPIRATION_MINS` | `token_expiration_mins` |
//! | `CENTRAL_CACHE_BACKEND` | `cache_backend` |
//! | `CENTRAL_EMAIL_BACKEND` | `email_backend` |
//! | `CENTRAL_DEFAULT_FROM_EMAIL` | `default_from_email` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use central_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/central.toml").unwrap();
//! settings.validate().unwrap();
//! ```

use std::path::Path;

use crate::error::CentralError;
use crate::settings::Settings;

/// Loads settings from a TOML string. Missing keys keep their defaults.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, CentralError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| CentralError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, CentralError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, CentralError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string. Missing keys keep their defaults.
pub fn from_json_str(json_str: &str) -> Result<Settings, CentralError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| CentralError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, CentralError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, CentralError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `CENTRAL_*` environment variable overrides to a settings struct.
///
/// Unparseable numeric values are ignored and the previous value is kept.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("CENTRAL_SECRET_KEY") {
        settings.secret_key = val;
    }

    if let Ok(val) = std::env::var("CENTRAL_RESET_TOKEN_SECRET_KEY") {
        settings.reset_token_secret_key = val;
    }

    if let Ok(val) = std::env::var("CENTRAL_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("CENTRAL_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("CENTRAL_TOKEN_EXPIRATION_MINS") {
        if let Ok(mins) = val.parse::<i64>() {
            settings.token_expiration_mins = mins;
        }
    }

    if let Ok(val) = std::env::var("CENTRAL_CACHE_BACKEND") {
        settings.cache_backend = val;
    }

    if let Ok(val) = std::env::var("CENTRAL_EMAIL_BACKEND") {
        settings.email_backend = val;
    }

    if let Ok(val) = std::env::var("CENTRAL_DEFAULT_FROM_EMAIL") {
        settings.default_from_email = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, CentralError> {
    std::fs::read_to_string(path).map_err(|e| {
        CentralError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, CentralError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        CentralError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    serde_json::from_value(merge_json(default_json, value)).map_err(|e| {
        CentralError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
