//! Configuration management for cosigner
//!
//! Settings are read from `~/.cosigner/config.toml` (or an explicit path);
//! a missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Largest accepted key nesting cap
pub const MAX_CONFIGURABLE_KEY_DEPTH: usize = 32;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Home directory not found")]
    HomeDirectoryNotFound,
}

impl From<ConfigError> for cosigner_errors::Error {
    fn from(err: ConfigError) -> Self {
        cosigner_errors::Error::Config(err.to_string())
    }
}

/// What to do when an account's key cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupFailurePolicy {
    /// Log the failure and leave the account out of the result
    #[default]
    Skip,
    /// Abort the whole resolution
    Fail,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub mirror: MirrorConfig,
    pub log: LogConfig,
}

/// Signing-requirement resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_concurrent_lookups: usize,
    pub lookup_timeout_ms: u64,
    pub on_lookup_failure: LookupFailurePolicy,
    pub max_key_depth: usize,
}

/// Mirror node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub default_network: String,
    pub request_timeout_ms: u64,
    /// Network name to mirror node base URL
    pub networks: BTreeMap<String, String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 8,
            lookup_timeout_ms: 10_000,
            on_lookup_failure: LookupFailurePolicy::Skip,
            max_key_depth: cosigner_crypto::MAX_KEY_DEPTH,
        }
    }
}

impl ResolverConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let networks = [
            ("mainnet", "https://mainnet-public.mirrornode.hedera.com"),
            ("testnet", "https://testnet.mirrornode.hedera.com"),
            ("previewnet", "https://previewnet.mirrornode.hedera.com"),
            ("local-node", "http://localhost:5551"),
        ]
        .into_iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect();

        Self {
            default_network: "testnet".to_string(),
            request_timeout_ms: 15_000,
            networks,
        }
    }
}

impl MirrorConfig {
    /// Base URL for a network name; anything that already looks like a URL
    /// is used as-is
    pub fn base_url(&self, network: &str) -> Option<String> {
        if network.starts_with("http://") || network.starts_with("https://") {
            return Some(network.trim_end_matches('/').to_string());
        }
        self.networks.get(network).cloned()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resolver: ResolverConfig::default(),
            mirror: MirrorConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::ReadError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirectoryNotFound)?;
        Ok(home.join(".cosigner").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.max_concurrent_lookups == 0 {
            return Err(ConfigError::InvalidValue(
                "resolver.max_concurrent_lookups must be at least 1".to_string(),
            ));
        }

        if self.resolver.lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "resolver.lookup_timeout_ms must be positive".to_string(),
            ));
        }

        if self.resolver.max_key_depth == 0
            || self.resolver.max_key_depth > MAX_CONFIGURABLE_KEY_DEPTH
        {
            return Err(ConfigError::InvalidValue(format!(
                "resolver.max_key_depth must be between 1 and {MAX_CONFIGURABLE_KEY_DEPTH}"
            )));
        }

        if self.mirror.base_url(&self.mirror.default_network).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "mirror.default_network '{}' has no configured URL",
                self.mirror.default_network
            )));
        }

        Ok(())
    }
}
