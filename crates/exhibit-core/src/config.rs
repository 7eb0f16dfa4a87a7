//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`/etc/exhibit-tag/config.toml` on Linux, or the path in
//!    `EXHIBIT_CONFIG`); missing files are skipped
//! 3. `EXHIBIT__<SECTION>__<KEY>` environment variables
//!
//! ```toml
//! [device]
//! name = "MuseumGuide"
//!
//! [scan]
//! refractory_window_ms = 1000
//!
//! [attributes]
//! surface_write_failures = false
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::attributes::SERVICE_UUID;
use crate::debounce::REFRACTORY_WINDOW_MS;
use crate::store::NAME_CAPACITY;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "EXHIBIT_CONFIG";

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "EXHIBIT";

/// Default advertised name.
pub const DEFAULT_DEVICE_NAME: &str = "MuseumGuide";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field holds an invalid value.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} configuration errors: {}", .0.len(), join_messages(.0))]
    MultipleValidationErrors(Vec<ConfigError>),
}

fn join_messages(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhibitConfig {
    /// Device identity.
    pub device: DeviceConfig,
    /// Scan debouncing.
    pub scan: ScanConfig,
    /// Attribute write policy.
    pub attributes: AttributeConfig,
    /// Local daemon settings.
    pub server: ServerConfig,
}

/// Device identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name advertised at boot, at most 64 bytes.
    pub name: String,
    /// Primary service UUID.
    pub service_uuid: Uuid,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            service_uuid: SERVICE_UUID,
        }
    }
}

/// Scan debounce settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Events closer together than this count as one visit.
    pub refractory_window_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            refractory_window_ms: REFRACTORY_WINDOW_MS,
        }
    }
}

/// Attribute write policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// Report encode, swap and advertising failures to the remote writer
    /// instead of acknowledging the write. Off by default: writers are
    /// told the write succeeded even when the NFC channel did not update.
    pub surface_write_failures: bool,
}

/// Local daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the bench HTTP API.
    pub bind_address: String,
    /// Use production logging (JSON files plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            production: false,
        }
    }
}

impl ExhibitConfig {
    /// Loads configuration from the default file location and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(Self::default_path, PathBuf::from);
        Self::load_from(path)
    }

    /// Loads configuration from `path` (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let loaded: Self = config::Config::builder()
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.device.name.len() > NAME_CAPACITY {
            errors.push(ConfigError::Validation {
                field: "device.name",
                message: format!(
                    "{} bytes exceeds the {NAME_CAPACITY}-byte limit",
                    self.device.name.len()
                ),
            });
        }
        if self.scan.refractory_window_ms == 0 {
            errors.push(ConfigError::Validation {
                field: "scan.refractory_window_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Err(err) = self.server.bind_address.parse::<SocketAddr>() {
            errors.push(ConfigError::Validation {
                field: "server.bind_address",
                message: err.to_string(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The platform configuration file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        // On the exhibit unit: /etc/exhibit-tag/config.toml
        // For development: ~/.config/exhibit-tag/config.toml
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/exhibit-tag/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "exhibit-tag").map_or_else(
                || PathBuf::from("config.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}
