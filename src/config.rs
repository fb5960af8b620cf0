//! Cache configuration module
//!
//! Handles loading and parsing of cache configuration from files and environment variables.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::container::MAX_PREALLOCATION;
use crate::cache::{DATA_FILE_NAME, INDEX_FILE_PREFIX};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Path to the game cache
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Name of the data file inside the cache directory
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Prefix of the index file names (the channel id is appended)
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Upper bound on memory preallocated for one decompressed container
    #[serde(default = "default_max_container_size")]
    pub max_container_size: usize,

    /// Check archive CRCs against their reference table
    #[serde(default)]
    pub verify_checksums: bool,
}

// Default value functions
fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/cache")
}

fn default_data_file() -> String {
    DATA_FILE_NAME.to_string()
}

fn default_index_prefix() -> String {
    INDEX_FILE_PREFIX.to_string()
}

fn default_max_container_size() -> usize {
    MAX_PREALLOCATION
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/cache.toml"),
            cache_path: default_cache_path(),
            data_file: default_data_file(),
            index_prefix: default_index_prefix(),
            max_container_size: default_max_container_size(),
            verify_checksums: false,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `path`
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("RUSTSCAPE_CACHE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/cache.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RUSTSCAPE_CACHE_PATH") {
            self.cache_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("RUSTSCAPE_CACHE_DATA_FILE") {
            self.data_file = val;
        }
        if let Ok(val) = env::var("RUSTSCAPE_CACHE_INDEX_PREFIX") {
            self.index_prefix = val;
        }
        if let Ok(val) = env::var("RUSTSCAPE_CACHE_MAX_CONTAINER_SIZE") {
            if let Ok(size) = val.parse() {
                self.max_container_size = size;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_CACHE_VERIFY") {
            self.verify_checksums = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_file.is_empty() {
            anyhow::bail!("Data file name must not be empty");
        }
        if self.index_prefix.is_empty() {
            anyhow::bail!("Index file prefix must not be empty");
        }
        if self.max_container_size == 0 {
            anyhow::bail!("Max container size must be greater than zero");
        }

        Ok(())
    }

    /// Full path of the data file
    pub fn data_path(&self) -> PathBuf {
        self.cache_path.join(&self.data_file)
    }

    /// Full path of the index file for `channel`
    pub fn index_path(&self, channel: u8) -> PathBuf {
        self.cache_path.join(format!("{}{}", self.index_prefix, channel))
    }
}
