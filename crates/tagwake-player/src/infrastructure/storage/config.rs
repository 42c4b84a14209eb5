//! TOML-based configuration for the player.
//!
//! Read from `--config <path>` when given, otherwise from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\Tagwake\config.toml`
//! - Linux:    `~/.config/tagwake/config.toml`
//! - macOS:    `~/Library/Application Support/Tagwake/config.toml`
//!
//! Every field has a serde default, so a missing file, an empty file and a
//! file written for an older version all load.  Example:
//!
//! ```toml
//! [player]
//! log_level = "debug"
//!
//! [dispatch]
//! queue_capacity = 16
//! validate_identities = true
//!
//! [radio]
//! backend = "simulated"
//!
//! [[radio.peers]]
//! address = "C0:FF:EE:00:00:01"
//! advertise_after_ms = 1500
//! attributes = [
//!   { service = "1802", attribute = "2a06", value = "T1" },
//!   { service = "1802", attribute = "db5c", value = "Kitchen" },
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagwake_core::IdentitySchema;
use thiserror::Error;

use crate::application::discover_tags::DiscoveryConfig;
use crate::application::dispatch_messages::{
    DispatchConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_SCAN_START_ATTEMPTS,
};
use crate::infrastructure::radio::simulated::SimulatedPeer;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level player configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub schema: IdentitySchema,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub radio: RadioSettings,
}

/// General player behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether the console presenter starts attached.
    #[serde(default = "default_true")]
    pub presenter_attached: bool,
    /// Delay between rendered characters of a delivered message.
    #[serde(default = "default_char_interval_ms")]
    pub char_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySettings {
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_scan_ended_timeout_ms")]
    pub scan_ended_timeout_ms: u64,
    #[serde(default = "default_scan_retry_delay_ms")]
    pub scan_retry_delay_ms: u64,
    #[serde(default = "default_scan_start_attempts")]
    pub scan_start_attempts: u32,
    /// Ignore detected tags that are not in the registry.
    #[serde(default)]
    pub validate_identities: bool,
}

/// Location of the tag registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistrySettings {
    /// Defaults to `tags.toml` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RadioBackend {
    #[default]
    Simulated,
    Ble,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RadioSettings {
    #[serde(default)]
    pub backend: RadioBackend,
    /// Peers of the simulated backend.  Ignored by `ble`.
    #[serde(default)]
    pub peers: Vec<SimulatedPeer>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_char_interval_ms() -> u64 {
    200
}
fn default_scan_window_ms() -> u64 {
    10_000
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_scan_ended_timeout_ms() -> u64 {
    3_000
}
fn default_scan_retry_delay_ms() -> u64 {
    1_000
}
fn default_scan_start_attempts() -> u32 {
    DEFAULT_SCAN_START_ATTEMPTS
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            presenter_attached: default_true(),
            char_interval_ms: default_char_interval_ms(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            scan_window_ms: default_scan_window_ms(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            scan_ended_timeout_ms: default_scan_ended_timeout_ms(),
            scan_retry_delay_ms: default_scan_retry_delay_ms(),
            scan_start_attempts: default_scan_start_attempts(),
            validate_identities: false,
        }
    }
}

impl AppConfig {
    /// Rejects values that parse but would stall the player.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.scan_window_ms == 0 {
            return Err(ConfigError::Invalid("discovery.scan_window_ms must be > 0".to_string()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid("dispatch.queue_capacity must be > 0".to_string()));
        }
        if self.dispatch.scan_start_attempts == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.scan_start_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            scan_window: Duration::from_millis(self.discovery.scan_window_ms),
            schema: self.schema,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: self.dispatch.queue_capacity,
            scan_ended_timeout: Duration::from_millis(self.dispatch.scan_ended_timeout_ms),
            scan_retry_delay: Duration::from_millis(self.dispatch.scan_retry_delay_ms),
            scan_start_attempts: self.dispatch.scan_start_attempts,
            validate_identities: self.dispatch.validate_identities,
        }
    }

    pub fn char_interval(&self) -> Duration {
        Duration::from_millis(self.player.char_interval_ms)
    }

    /// Resolves the tag registry file.
    ///
    /// An explicit `[registry] path` wins; otherwise `tags.toml` is placed
    /// next to `config_path`, or in the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] when no location can be
    /// derived.
    pub fn registry_path(&self, config_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.registry.path {
            return Ok(path.clone());
        }
        match config_path.and_then(Path::parent) {
            Some(dir) => Ok(dir.join("tags.toml")),
            None => Ok(config_dir()?.join("tags.toml")),
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads and validates the configuration.
///
/// With `explicit` set, that file must exist.  Without it, the platform
/// default path is tried and a missing file yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`]
/// for malformed TOML and [`ConfigError::Invalid`] for unusable values.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let config = match explicit {
        Some(path) => load_config_from(path)?,
        None => {
            let path = config_file_path()?;
            match load_config_from(&path) {
                Err(ConfigError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    AppConfig::default()
                }
                other => other?,
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Resolves the platform config base directory including the `Tagwake` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Tagwake"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tagwake"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Tagwake"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
