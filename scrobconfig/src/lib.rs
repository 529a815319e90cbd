//! # MultiScrobbler Configuration Module
//!
//! This module provides configuration management for MultiScrobbler, including:
//! - Loading configuration from a YAML file in the configuration directory
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters for host settings and entity blocks
//!
//! ## Usage
//!
//! ```no_run
//! use scrobconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let sources = config.source_blocks();
//! println!("{} source block(s), listening on {}", sources.len(), port);
//! ```

use anyhow::{Result, anyhow};
use dirs::config_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{env, fs, path::Path, sync::Arc};
use tracing::{info, warn};

mod entities;
pub mod secrets;

pub use entities::{EntityBlock, Provenance};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("scrobbler.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(Config::load_config(""));
}

const ENV_CONFIG_DIR: &str = "CONFIG_DIR";
const ENV_PREFIX: &str = "SCROBBLER_CONFIG__";
const ENV_PORT: &str = "PORT";

const CONFIG_FILE_NAME: &str = "config.yaml";
const DEFAULT_HTTP_PORT: u16 = 9078;

/// Top-level keys that used to describe a single source directly.
///
/// They are still honored as one implicit `unnamed` source each.
const LEGACY_SOURCE_KEYS: &[&str] = &["spotify", "plex"];

/// Configuration tree handed to the rest of the application
///
/// The tree is read once at start-up and never written back. A configuration
/// file that cannot be parsed is reported and replaced by the embedded
/// defaults, so the process keeps running with no sources and no clients.
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Value,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Using config directory from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new("config").is_dir() {
            return "config".to_string();
        }

        // 4. Try the user configuration directory
        if let Some(base) = config_dir() {
            let user_config = base.join("multi-scrobbler");
            if user_config.is_dir() {
                return user_config.to_string_lossy().to_string();
            }
        }

        "config".to_string()
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external `config.yaml` file if present and valid
    /// 4. Applies environment variable overrides
    ///
    /// A missing file is silent, an unreadable or invalid file is logged as a
    /// warning. Neither is fatal.
    pub fn load_config(directory: &str) -> Self {
        let config_dir = Self::find_config_dir(directory);
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join(CONFIG_FILE_NAME)
            .to_string_lossy()
            .to_string();

        let mut data = default_tree();

        match fs::read_to_string(&path) {
            Ok(text) => match serde_yaml::from_str::<Value>(&text) {
                Ok(external) => {
                    info!(config_file = %path, "Loaded config file");
                    merge_yaml(&mut data, &external);
                }
                Err(err) => {
                    warn!(config_file = %path, "App config file exists but could not be parsed: {}", err);
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
            Err(err) => {
                warn!(config_file = %path, "App config file exists but could not be read: {}", err);
            }
        }

        let mut data = lower_keys_value(data);
        apply_env_overrides(&mut data);

        Self {
            config_dir,
            path,
            data,
        }
    }

    /// Builds a configuration from an in-memory YAML document
    ///
    /// Unlike [`Config::load_config`] this fails on invalid YAML and ignores
    /// the environment, which makes it the entry point for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let external: Value = serde_yaml::from_str(yaml)?;
        let mut data = default_tree();
        merge_yaml(&mut data, &external);

        Ok(Self {
            config_dir: String::new(),
            path: String::new(),
            data: lower_keys_value(data),
        })
    }

    /// Directory the configuration was read from
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Path of the `config.yaml` file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let mut current = &self.data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Gets the HTTP port from configuration
    ///
    /// Returns the configured HTTP port, or the default port (9078) if not configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("Invalid HTTP port '{}', using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            _ => DEFAULT_HTTP_PORT,
        }
    }

    /// Gets the public base URL of the HTTP server
    ///
    /// Used to build the OAuth redirect URIs. Falls back to
    /// `http://localhost:<port>` when not configured.
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["host", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.get_http_port()),
        }
    }

    /// Named source blocks declared under `sources:`
    pub fn source_blocks(&self) -> Vec<EntityBlock> {
        entities::parse_blocks(self.get_value(&["sources"]).ok(), "sources")
    }

    /// Named client blocks declared under `clients:`
    pub fn client_blocks(&self) -> Vec<EntityBlock> {
        entities::parse_blocks(self.get_value(&["clients"]).ok(), "clients")
    }

    /// Implicit sources synthesized from deprecated top-level keys
    ///
    /// Each present key yields one block named `unnamed`, tagged with its
    /// provenance, and a deprecation warning.
    pub fn legacy_source_blocks(&self) -> Vec<EntityBlock> {
        LEGACY_SOURCE_KEYS
            .iter()
            .filter_map(|key| {
                let data = self.get_value(&[key]).ok()?;
                warn!(
                    "DEPRECATED: Using '{}' top-level property in {} will be removed in a future version. Please use 'sources' instead.",
                    key, CONFIG_FILE_NAME
                );
                Some(EntityBlock::legacy(key, data))
            })
            .collect()
    }
}

/// Returns the global configuration instance
///
/// The configuration is lazily loaded on first access from the directory
/// designated by `CONFIG_DIR` (or `./config`).
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn default_tree() -> Value {
    // Le YAML embarqué est validé par les tests
    serde_yaml::from_str(DEFAULT_CONFIG).unwrap_or(Value::Mapping(Mapping::new()))
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
            let key_path = rest.split("__").collect::<Vec<_>>();
            let _ = set_value_internal(config, &key_path, convert_env_value(&value));
        }
    }

    if let Ok(port) = env::var(ENV_PORT) {
        let _ = set_value_internal(config, &["host", "http_port"], convert_env_value(&port));
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn convert_env_value(value: &str) -> Value {
    if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
        return parsed;
    }
    Value::String(value.to_string())
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                if let Value::String(s) = k {
                    new_map.insert(Value::String(s.to_lowercase()), lower_keys_value(v));
                } else {
                    new_map.insert(k, lower_keys_value(v));
                }
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key, scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_is_valid() {
        let value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        assert!(value.is_mapping());
    }

    #[test]
    fn test_defaults_without_user_file() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_http_port(), 9078);
        assert_eq!(config.get_base_url(), "http://localhost:9078");
        assert!(config.source_blocks().is_empty());
        assert!(config.client_blocks().is_empty());
        assert!(config.legacy_source_blocks().is_empty());
    }

    #[test]
    fn test_host_overrides_merge_with_defaults() {
        let config = Config::from_yaml_str(
            "host:\n  http_port: 8123\n  base_url: https://scrobble.example.org/\n",
        )
        .unwrap();
        assert_eq!(config.get_http_port(), 8123);
        assert_eq!(config.get_base_url(), "https://scrobble.example.org");
    }

    #[test]
    fn test_port_as_string() {
        let config = Config::from_yaml_str("host:\n  http_port: \"9100\"\n").unwrap();
        assert_eq!(config.get_http_port(), 9100);

        let config = Config::from_yaml_str("host:\n  http_port: nope\n").unwrap();
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let config = Config::from_yaml_str("Host:\n  HTTP_Port: 9200\n").unwrap();
        assert_eq!(config.get_http_port(), 9200);
    }

    #[test]
    fn test_invalid_yaml_is_rejected_by_from_str() {
        assert!(Config::from_yaml_str("host: [unclosed").is_err());
    }

    #[test]
    fn test_set_value_internal_creates_path() {
        let mut data = Value::Mapping(Mapping::new());
        set_value_internal(&mut data, &["Host", "http_port"], Value::from(1234)).unwrap();
        let config = Config {
            config_dir: String::new(),
            path: String::new(),
            data,
        };
        assert_eq!(config.get_http_port(), 1234);
    }

    #[test]
    fn test_legacy_blocks_are_tagged() {
        let config = Config::from_yaml_str(
            "spotify:\n  clientId: abc\n  clientSecret: def\nplex:\n  user: [me]\n",
        )
        .unwrap();
        let legacy = config.legacy_source_blocks();
        assert_eq!(legacy.len(), 2);
        assert_eq!(legacy[0].kind, "spotify");
        assert_eq!(legacy[0].name, "unnamed");
        assert_eq!(legacy[0].provenance, Provenance::LegacyTopLevel);
        assert_eq!(legacy[1].kind, "plex");
    }
}
