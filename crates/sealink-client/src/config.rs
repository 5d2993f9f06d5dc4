//! Configuration management for sealink-client
//!
//! Settings are read from a TOML file and then overridden by command-line
//! flags.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/sealink/client.toml`
//! - Windows: `%APPDATA%\sealink\client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use sealink_core::HandshakeConfig;
use sealink_crypto::codec;
use sealink_crypto::keys::{DEFAULT_RSA_BITS, SUPPORTED_RSA_BITS};
use sealink_crypto::CipherSuite;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Client configuration
///
/// # Example TOML
///
/// ```toml
/// [server]
/// url = "http://127.0.0.1:8080"
/// pinned_key = ""  # base64 server signing key, empty = trust on first use
///
/// [handshake]
/// suite = "ed25519+x25519-box+aes256gcm"
/// rsa_bits = 2048
/// timeout_seconds = 10
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub handshake: HandshakeSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the server is and which key it must present
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_url")]
    pub url: String,

    /// Base64 signing key the server must present
    #[serde(default)]
    pub pinned_key: Option<String>,
}

fn default_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            pinned_key: None,
        }
    }
}

/// Handshake parameters
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HandshakeSection {
    #[serde(default = "default_suite")]
    pub suite: String,

    #[serde(default = "default_rsa_bits")]
    pub rsa_bits: usize,

    /// Round-trip timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_suite() -> String {
    CipherSuite::default().to_string()
}

fn default_rsa_bits() -> usize {
    DEFAULT_RSA_BITS
}

fn default_timeout() -> u64 {
    10
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self {
            suite: default_suite(),
            rsa_bits: default_rsa_bits(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "sealink", "sealink")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.url.starts_with("http://") && !self.server.url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid server URL '{}': must start with http:// or https://",
                self.server.url
            )));
        }

        self.pinned_key()?;
        self.cipher_suite()?;

        if !SUPPORTED_RSA_BITS.contains(&self.handshake.rsa_bits) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid rsa_bits {}. Valid values: {:?}",
                self.handshake.rsa_bits, SUPPORTED_RSA_BITS
            )));
        }

        if self.handshake.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    pub fn cipher_suite(&self) -> Result<CipherSuite, ConfigError> {
        self.handshake
            .suite
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("Invalid suite: {}", e)))
    }

    /// Decoded pinned key. An empty string counts as unset.
    pub fn pinned_key(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        match self.server.pinned_key.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => codec::decode("pinned_key", text)
                .map(Some)
                .map_err(|e| ConfigError::ValidationError(e.to_string())),
        }
    }

    /// Settings for the client handshake
    pub fn handshake_config(&self) -> Result<HandshakeConfig, ConfigError> {
        self.validate()?;
        Ok(HandshakeConfig {
            suite: self.cipher_suite()?,
            rsa_bits: self.handshake.rsa_bits,
            round_trip_timeout: Duration::from_secs(self.handshake.timeout_seconds),
            pinned_server_key: self.pinned_key()?,
        })
    }
}

/// CLI overrides that take precedence over config file values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub suite: Option<String>,
    pub pinned_key: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub log_level: Option<String>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref url) = overrides.server_url {
            self.server.url = url.clone();
        }
        if let Some(ref suite) = overrides.suite {
            self.handshake.suite = suite.clone();
        }
        if let Some(ref key) = overrides.pinned_key {
            self.server.pinned_key = Some(key.clone());
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.handshake.timeout_seconds = timeout;
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
        self
    }
}
