//! Configuration module for the embeddings index store and search client.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RE_` and use double underscores
//! to separate nested levels:
//! - `RE_CLIENT__REQUEST_TIMEOUT_SECS=10` sets `client.request_timeout_secs`
//! - `RE_STORAGE__CHUNK_ROWS=500` sets `storage.chunk_rows`
//! - `RE_CLIENT__ENDPOINTS='["http://a:9991","http://b:9991"]'` sets `client.endpoints`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched upward from the working
/// directory.
pub const CONFIG_DIR: &str = ".repo-embeddings";

const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "RE_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    /// Search backend settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Index blob storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URLs of the embeddings backends. Empty means not configured.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory of the local blob store
    #[serde(default = "default_blob_root")]
    pub blob_root: PathBuf,

    /// Matrix rows per encoded chunk
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,

    /// Capacity of the pipe between encoder and uploader
    #[serde(default = "default_upload_buffer_bytes")]
    pub upload_buffer_bytes: usize,
}

// Default value functions
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_blob_root() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("blobs")
}
fn default_chunk_rows() -> usize {
    crate::storage::DEFAULT_CHUNK_ROWS
}
fn default_upload_buffer_bytes() -> usize {
    crate::storage::DEFAULT_UPLOAD_BUFFER_BYTES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            client: ClientConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: default_blob_root(),
            chunk_rows: default_chunk_rows(),
            upload_buffer_bytes: default_upload_buffer_bytes(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration with `path` as the settings file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore (__) separates nested levels, single
            // underscores stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for the config directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(SETTINGS_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
