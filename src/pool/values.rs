// src/pool/values.rs

//! Validation of the pool's key and queued values.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{ProcpoolError, Result};

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:[A-Z0-9]([A-Z0-9-]*[A-Z0-9])?$").expect("valid key regex")
});

/// Check a pool key such as `:HOST` or `:SHARD-1`.
pub fn validate_key(key: &str) -> Result<()> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(ProcpoolError::InvalidKey(key.to_string()))
    }
}

/// Name of the substitution variable a key injects: `:HOST` becomes `HOST`,
/// which commands reference as `$HOST$`.
pub fn variable_name(key: &str) -> &str {
    key.strip_prefix(':').unwrap_or(key)
}

/// Convert a scalar TOML value into the text substituted into commands.
///
/// Arrays and tables are rejected.
pub fn scalar_to_string(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(dt) => Ok(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            Err(ProcpoolError::InvalidValue(value.to_string()))
        }
    }
}
