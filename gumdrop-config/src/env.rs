// Environment variable loading

use crate::Result;
use std::collections::HashMap;
use std::env;

/// Environment variable loader.
///
/// Variables are mapped onto dotted option keys: the first underscore after
/// the prefix separates the section from the option name, so
/// `GUMDROP_SCHEDULER_PER_STREAM_CAP_BYTES` becomes
/// `scheduler.per_stream_cap_bytes`.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a loader with the given variable prefix (without the
    /// trailing underscore).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load every matching environment variable as a dotted key.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        let marker = format!("{}_", self.prefix);
        let mut config = HashMap::new();

        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(&marker) {
                if let Some(dotted) = Self::to_dotted(rest) {
                    config.insert(dotted, value);
                }
            }
        }

        Ok(config)
    }

    /// Load a specific option by its dotted key.
    pub fn load_var(&self, dotted_key: &str) -> Result<String> {
        env::var(self.var_name(dotted_key)).map_err(crate::ConfigError::EnvError)
    }

    /// Load with a default value.
    pub fn load_var_or(&self, dotted_key: &str, default: &str) -> String {
        self.load_var(dotted_key)
            .unwrap_or_else(|_| default.to_string())
    }

    /// Environment variable name for a dotted key.
    pub fn var_name(&self, dotted_key: &str) -> String {
        format!(
            "{}_{}",
            self.prefix,
            dotted_key.replace('.', "_").to_uppercase()
        )
    }

    fn to_dotted(rest: &str) -> Option<String> {
        let (section, option) = rest.split_once('_')?;
        if section.is_empty() || option.is_empty() {
            return None;
        }
        Some(format!(
            "{}.{}",
            section.to_lowercase(),
            option.to_lowercase()
        ))
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new("GUMDROP")
    }
}
