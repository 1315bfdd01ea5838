//! Configuration management for xnet.
//!
//! Parses `xnet.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Values without `${` are left untouched.
//!
//! Expanded fields:
//! - `network.default_network`
//! - `catalog.networks[].hash`

mod expand;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Value of `network.default_network` meaning "no pinned network".
pub const NO_DEFAULT_NETWORK: &str = "None";

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "xnet.toml";

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the pinned default network.
    pub default_network: Option<String>,
    /// Override the default multiplier.
    pub default_multiplier: Option<f32>,
    /// Override hash recording.
    pub add_hashes_to_params: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network handler options.
    pub network: NetworkConfig,
    /// Known networks (used for dry runs).
    pub catalog: CatalogConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Options read by the network handler on every activation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network appended to every prompt unless already requested.
    /// [`NO_DEFAULT_NETWORK`] disables it.
    pub default_network: String,
    /// Multiplier used for the pinned network.
    pub default_multiplier: f32,
    /// Record short hashes of loaded networks in generation parameters.
    pub add_hashes_to_params: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_network: NO_DEFAULT_NETWORK.to_owned(),
            default_multiplier: 1.0,
            add_hashes_to_params: true,
        }
    }
}

impl NetworkConfig {
    /// The pinned network, unless disabled.
    #[must_use]
    pub fn pinned(&self) -> Option<&str> {
        let name = self.default_network.as_str();
        (!name.is_empty() && name != NO_DEFAULT_NETWORK).then_some(name)
    }
}

/// Catalog of known networks.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Network entries.
    pub networks: Vec<CatalogEntry>,
}

/// One known network.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Name used in directives.
    pub name: String,
    /// Alternative name accepted in directives.
    #[serde(default)]
    pub alias: Option<String>,
    /// Short content hash, if known.
    #[serde(default)]
    pub hash: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`network.default_network`").
        field: String,
        /// Error message (e.g., "${`XNET_DEFAULT`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `xnet.toml` in current directory and parents,
    /// falling back to defaults.
    ///
    /// CLI settings are applied after loading, so they take precedence over
    /// config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the result does not validate.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(default_network) = &settings.default_network {
            self.network.default_network.clone_from(default_network);
        }
        if let Some(multiplier) = settings.default_multiplier {
            self.network.default_multiplier = multiplier;
        }
        if let Some(add_hashes) = settings.add_hashes_to_params {
            self.network.add_hashes_to_params = add_hashes;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.network.default_multiplier.is_finite() {
            return Err(ConfigError::Validation(
                "network.default_multiplier must be a finite number".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.catalog.networks {
            if entry.name.is_empty() {
                return Err(ConfigError::Validation(
                    "catalog.networks[].name cannot be empty".to_owned(),
                ));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "catalog network {} is listed more than once",
                    entry.name
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.network.default_network =
            expand::expand_env(&self.network.default_network, "network.default_network")?;

        for entry in &mut self.catalog.networks {
            if let Some(ref hash) = entry.hash {
                entry.hash = Some(expand::expand_env(hash, "catalog.networks[].hash")?);
            }
        }

        Ok(())
    }
}
