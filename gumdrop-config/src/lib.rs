// Configuration management for the Gumdrop server
//
// Loads the recognized scheduler/async options from environment variables,
// JSON or TOML files, and .env files, and turns them into the typed
// configuration structs the core consumes. Every value is stored under its
// dotted option key together with the source it came from, so operators
// can ask where an effective setting originated.

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use gumdrop_core::{AsyncConfig, SchedulerConfig};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Recognized option keys.
pub const KEY_PER_STREAM_CAP: &str = "scheduler.per_stream_cap_bytes";
pub const KEY_BIG_STREAM_CAP: &str = "scheduler.big_stream_cap_bytes";
pub const KEY_STARVATION_THRESHOLD: &str = "scheduler.starvation_threshold_rounds";
pub const KEY_DEFAULT_TIMEOUT: &str = "async.default_timeout_ms";
pub const KEY_EXECUTOR_THREADS: &str = "async.executor_threads";

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Loaded from a JSON/TOML/.env file
    File,
    /// Loaded from the process environment
    Env,
    /// Set programmatically
    Override,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    source: Source,
}

/// Main configuration manager.
///
/// Values live in a flat map keyed by dotted option names
/// (`scheduler.per_stream_cap_bytes`), each tagged with its [`Source`].
/// Whatever loads last wins, so the conventional order is: file first,
/// then environment, then programmatic overrides.
#[derive(Clone)]
pub struct ConfigManager {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new configuration manager with the `GUMDROP` env prefix.
    pub fn new() -> Self {
        Self::with_prefix("GUMDROP")
    }

    /// Create with a custom environment variable prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: prefix.into(),
        }
    }

    fn store(&self, key: String, value: Value, source: Source) {
        self.entries
            .write()
            .unwrap()
            .insert(key, Entry { value, source });
    }

    fn raw(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .map(|e| e.value.clone())
    }

    /// Load every `PREFIX_SECTION_OPTION` environment variable as its
    /// dotted key.
    pub fn load_env(&self) -> Result<()> {
        for (key, raw) in EnvLoader::new(self.env_prefix.clone()).load()? {
            self.store(key, Value::String(raw), Source::Env);
        }
        Ok(())
    }

    /// Apply a .env file to the process environment, then load from it.
    /// Without an explicit path, a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(p) => {
                dotenvy::from_path(p).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        self.load_env()
    }

    /// Load configuration from a file, auto-detecting the format.
    pub fn load_file(&self, path: &str) -> Result<()> {
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.absorb(data, Source::File);
        Ok(())
    }

    /// Load configuration from a string in the given format.
    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.absorb(data, Source::File);
        Ok(())
    }

    /// Flatten one level of nesting into dotted keys: a `[scheduler]`
    /// table becomes `scheduler.*` entries.
    fn absorb(&self, data: Value, source: Source) {
        let Value::Object(map) = data else { return };
        for (key, value) in map {
            match value {
                Value::Object(section) => {
                    for (option, v) in section {
                        self.store(format!("{}.{}", key, option), v, source);
                    }
                }
                other => self.store(key, other, source),
            }
        }
    }

    /// Set an option programmatically. Wins over file and environment
    /// values for the same key.
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        self.store(key.to_string(), value, Source::Override);
        Ok(())
    }

    /// Get a typed option value.
    ///
    /// Environment values arrive as strings; when direct deserialization
    /// fails on a string, the string is re-read as a bare JSON literal so
    /// `"8192"` still yields an integer and `"true"` a bool.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .raw(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Ok(typed),
            Err(direct) => {
                if let Value::String(s) = &value {
                    if let Ok(literal) = serde_json::from_str::<Value>(s) {
                        return serde_json::from_value(literal).map_err(|e| {
                            ConfigError::DeserializationError(format!("{}: {}", key, e))
                        });
                    }
                }
                Err(ConfigError::DeserializationError(format!(
                    "{}: {}",
                    key, direct
                )))
            }
        }
    }

    fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get::<u64>(key) {
            Ok(v) => Ok(v),
            Err(ConfigError::KeyNotFound(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Where the value for `key` came from, if it is set at all.
    pub fn source(&self, key: &str) -> Option<Source> {
        self.entries.read().unwrap().get(key).map(|e| e.source)
    }

    /// Whether `key` carries a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    /// All option keys, sorted for stable diagnostics output.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overlay another manager's entries onto this one (the overlay wins
    /// on conflicts, source tags included).
    pub fn merge(&self, overlay: &ConfigManager) {
        let incoming: Vec<(String, Entry)> = overlay
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        let mut entries = self.entries.write().unwrap();
        for (key, entry) in incoming {
            entries.insert(key, entry);
        }
    }

    /// Rebuild the nested object the dotted keys were flattened from:
    /// `scheduler.per_stream_cap_bytes` becomes
    /// `{"scheduler": {"per_stream_cap_bytes": ...}}`.
    pub fn to_nested_value(&self) -> Value {
        let entries = self.entries.read().unwrap();
        let mut root = serde_json::Map::new();
        for (key, entry) in entries.iter() {
            match key.split_once('.') {
                Some((section, option)) => {
                    let slot = root
                        .entry(section.to_string())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    if let Value::Object(table) = slot {
                        table.insert(option.to_string(), entry.value.clone());
                    }
                }
                None => {
                    root.insert(key.clone(), entry.value.clone());
                }
            }
        }
        Value::Object(root)
    }

    /// Deserialize the nested view into a validated config type.
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let typed: T = serde_json::from_value(self.to_nested_value())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }

    /// Build the scheduler configuration from the recognized keys,
    /// falling back to the core defaults.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let defaults = SchedulerConfig::default();
        let per_stream = self.get_u64_or(KEY_PER_STREAM_CAP, defaults.per_stream_cap_bytes as u64)?;
        let big_stream = self.get_u64_or(KEY_BIG_STREAM_CAP, defaults.big_stream_cap_bytes as u64)?;
        let threshold = self.get_u64_or(
            KEY_STARVATION_THRESHOLD,
            u64::from(defaults.starvation_threshold_rounds),
        )?;

        ConfigValidator::positive(per_stream, KEY_PER_STREAM_CAP)?;
        ConfigValidator::positive(big_stream, KEY_BIG_STREAM_CAP)?;
        ConfigValidator::in_range(threshold, 1, u64::from(u32::MAX), KEY_STARVATION_THRESHOLD)?;

        Ok(SchedulerConfig::builder()
            .per_stream_cap_bytes(per_stream as usize)
            .big_stream_cap_bytes(big_stream as usize)
            .starvation_threshold_rounds(threshold as u32)
            .build())
    }

    /// Build the async configuration from the recognized keys, falling
    /// back to the core defaults. A timeout of 0 disables the default
    /// deadline.
    pub fn async_config(&self) -> Result<AsyncConfig> {
        let defaults = AsyncConfig::default();
        let timeout = self.get_u64_or(KEY_DEFAULT_TIMEOUT, defaults.default_timeout_ms)?;
        let threads = self.get_u64_or(KEY_EXECUTOR_THREADS, defaults.executor_threads as u64)?;

        ConfigValidator::in_range(threads, 1, 1024, KEY_EXECUTOR_THREADS)?;

        Ok(AsyncConfig::builder()
            .default_timeout_ms(timeout)
            .executor_threads(threads as usize)
            .build())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
