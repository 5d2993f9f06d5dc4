//! Configuration management

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sealink_core::responder::{DEFAULT_GREETING, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};
use sealink_core::ResponderConfig;
use sealink_crypto::keys::{DEFAULT_RSA_BITS, SUPPORTED_RSA_BITS};
use sealink_crypto::CipherSuite;

/// Longest greeting the server will seal for a new session.
pub const MAX_GREETING_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Cipher suite in `signature+wrap+aead` form.
    pub suite: String,
    pub rsa_bits: usize,
    pub greeting: String,
    pub send_greeting: bool,
    pub cors_permissive: bool,
    /// Idle seconds before a session is dropped.
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
    /// Seconds between sweeps for idle sessions.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            suite: CipherSuite::default().to_string(),
            rsa_bits: DEFAULT_RSA_BITS,
            greeting: DEFAULT_GREETING.to_string(),
            send_greeting: true,
            cors_permissive: false,
            session_ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::load`] with variables read through `var`.
    pub fn load_with<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = var("SEALINK_SERVER_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }

        if let Some(suite) = var("SEALINK_SERVER_SUITE") {
            config.suite = suite;
        }

        if let Some(bits) = var("SEALINK_SERVER_RSA_BITS") {
            config.rsa_bits = bits
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid rsa_bits: {}", e)))?;
        }

        if let Some(greeting) = var("SEALINK_SERVER_GREETING") {
            config.greeting = greeting;
        }

        if let Some(enabled) = var("SEALINK_SERVER_SEND_GREETING") {
            config.send_greeting = enabled.parse().unwrap_or(true);
        }

        if let Some(enabled) = var("SEALINK_SERVER_CORS_PERMISSIVE") {
            config.cors_permissive = enabled.parse().unwrap_or(false);
        }

        if let Some(secs) = var("SEALINK_SERVER_SESSION_TTL_SECS") {
            config.session_ttl_secs = secs
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid session_ttl_secs: {}", e)))?;
        }

        if let Some(max) = var("SEALINK_SERVER_MAX_SESSIONS") {
            config.max_sessions = max
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid max_sessions: {}", e)))?;
        }

        if let Some(secs) = var("SEALINK_SERVER_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = secs
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid sweep_interval_secs: {}", e)))?;
        }

        // TOML file wins over the environment
        if let Some(config_path) = var("SEALINK_SERVER_CONFIG") {
            config.load_from_toml(&config_path)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Load from TOML config file
    fn load_from_toml(&mut self, path: &str) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.apply_toml(&content)
    }

    fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let toml_config: toml::Value = toml::from_str(content)?;

        if let Some(addr) = toml_config.get("listen_addr").and_then(|v| v.as_str()) {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr in TOML: {}", e)))?;
        }

        if let Some(suite) = toml_config.get("suite").and_then(|v| v.as_str()) {
            self.suite = suite.to_string();
        }

        if let Some(bits) = toml_config.get("rsa_bits").and_then(|v| v.as_integer()) {
            self.rsa_bits = usize::try_from(bits)
                .map_err(|_| ConfigError::Invalid(format!("Invalid rsa_bits in TOML: {}", bits)))?;
        }

        if let Some(greeting) = toml_config.get("greeting").and_then(|v| v.as_str()) {
            self.greeting = greeting.to_string();
        }

        if let Some(enabled) = toml_config.get("send_greeting").and_then(|v| v.as_bool()) {
            self.send_greeting = enabled;
        }

        if let Some(enabled) = toml_config.get("cors_permissive").and_then(|v| v.as_bool()) {
            self.cors_permissive = enabled;
        }

        if let Some(secs) = toml_config.get("session_ttl_secs").and_then(|v| v.as_integer()) {
            self.session_ttl_secs = u64::try_from(secs)
                .map_err(|_| ConfigError::Invalid(format!("Invalid session_ttl_secs in TOML: {}", secs)))?;
        }

        if let Some(max) = toml_config.get("max_sessions").and_then(|v| v.as_integer()) {
            self.max_sessions = usize::try_from(max)
                .map_err(|_| ConfigError::Invalid(format!("Invalid max_sessions in TOML: {}", max)))?;
        }

        if let Some(secs) = toml_config.get("sweep_interval_secs").and_then(|v| v.as_integer()) {
            self.sweep_interval_secs = u64::try_from(secs)
                .map_err(|_| ConfigError::Invalid(format!("Invalid sweep_interval_secs in TOML: {}", secs)))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let suite = self.cipher_suite()?;

        if self.uses_rsa(suite) && !SUPPORTED_RSA_BITS.contains(&self.rsa_bits) {
            return Err(ConfigError::Invalid(format!(
                "rsa_bits must be one of {:?}",
                SUPPORTED_RSA_BITS
            )));
        }

        if self.send_greeting && self.greeting.is_empty() {
            return Err(ConfigError::Invalid(
                "greeting must not be empty when send_greeting is set".to_string(),
            ));
        }

        if self.greeting.len() > MAX_GREETING_LEN {
            return Err(ConfigError::Invalid(format!(
                "greeting is longer than {} bytes",
                MAX_GREETING_LEN
            )));
        }

        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session_ttl_secs must be positive".to_string()));
        }

        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be positive".to_string()));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".to_string()));
        }

        Ok(())
    }

    /// Parsed cipher suite
    pub fn cipher_suite(&self) -> Result<CipherSuite, ConfigError> {
        self.suite
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("Invalid suite: {}", e)))
    }

    /// Settings for the in-process responder
    pub fn responder_config(&self) -> Result<ResponderConfig, ConfigError> {
        Ok(ResponderConfig {
            suite: self.cipher_suite()?,
            rsa_bits: self.rsa_bits,
            greeting: self.send_greeting.then(|| self.greeting.clone()),
            session_ttl: self.session_ttl(),
            max_sessions: self.max_sessions,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn uses_rsa(&self, suite: CipherSuite) -> bool {
        use sealink_crypto::{KeyWrapScheme, SignatureScheme};
        suite.signature == SignatureScheme::RsaPss || suite.key_wrap == KeyWrapScheme::RsaOaep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::load_with(env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.cipher_suite().unwrap(), CipherSuite::curve25519());
        let responder = config.responder_config().unwrap();
        assert_eq!(responder.greeting.as_deref(), Some(DEFAULT_GREETING));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::load_with(env(&[
            ("SEALINK_SERVER_LISTEN_ADDR", "0.0.0.0:9443"),
            ("SEALINK_SERVER_SUITE", "rsa-pss-sha256+rsa-oaep-sha256+chacha20poly1305"),
            ("SEALINK_SERVER_RSA_BITS", "3072"),
            ("SEALINK_SERVER_SEND_GREETING", "false"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9443);
        assert_eq!(config.rsa_bits, 3072);
        assert!(!config.send_greeting);
        assert!(config.responder_config().unwrap().greeting.is_none());
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(matches!(
            ServerConfig::load_with(env(&[("SEALINK_SERVER_LISTEN_ADDR", "nowhere")])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::load_with(env(&[("SEALINK_SERVER_SUITE", "ed25519+x25519-box")])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::load_with(env(&[
                ("SEALINK_SERVER_SUITE", "rsa-pss-sha256+rsa-oaep-sha256+aes256gcm"),
                ("SEALINK_SERVER_RSA_BITS", "1024"),
            ])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rsa_bits_ignored_for_curve_suite() {
        let config = ServerConfig {
            rsa_bits: 1024,
            ..ServerConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_greeting_validation() {
        let empty = ServerConfig {
            greeting: String::new(),
            ..ServerConfig::default()
        };
        assert!(empty.validate().is_err());

        let disabled = ServerConfig {
            greeting: String::new(),
            send_greeting: false,
            ..ServerConfig::default()
        };
        disabled.validate().unwrap();

        let long = ServerConfig {
            greeting: "x".repeat(MAX_GREETING_LEN + 1),
            ..ServerConfig::default()
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_toml_file_overrides_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
listen_addr = "127.0.0.1:7000"
suite = "ed25519+x25519-box+chacha20poly1305"
greeting = "welcome"
cors_permissive = true
"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = ServerConfig::load_with(env(&[
            ("SEALINK_SERVER_LISTEN_ADDR", "127.0.0.1:6000"),
            ("SEALINK_SERVER_CONFIG", path.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 7000);
        assert_eq!(config.greeting, "welcome");
        assert!(config.cors_permissive);
        assert_eq!(
            config.cipher_suite().unwrap().aead,
            sealink_crypto::AeadAlgorithm::ChaCha20Poly1305
        );
    }

    #[test]
    fn test_bad_toml() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.apply_toml("listen_addr = "),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            config.apply_toml("rsa_bits = -1"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_session_limits() {
        let config = ServerConfig::load_with(env(&[
            ("SEALINK_SERVER_SESSION_TTL_SECS", "90"),
            ("SEALINK_SERVER_MAX_SESSIONS", "16"),
            ("SEALINK_SERVER_SWEEP_INTERVAL_SECS", "5"),
        ]))
        .unwrap();
        let responder = config.responder_config().unwrap();
        assert_eq!(responder.session_ttl, Duration::from_secs(90));
        assert_eq!(responder.max_sessions, 16);
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));

        let mut from_file = ServerConfig::default();
        from_file
            .apply_toml("session_ttl_secs = 600\nmax_sessions = 2")
            .unwrap();
        assert_eq!(from_file.session_ttl(), Duration::from_secs(600));
        assert_eq!(from_file.max_sessions, 2);

        for (key, value) in [
            ("SEALINK_SERVER_SESSION_TTL_SECS", "0"),
            ("SEALINK_SERVER_MAX_SESSIONS", "0"),
            ("SEALINK_SERVER_SWEEP_INTERVAL_SECS", "0"),
        ] {
            assert!(matches!(
                ServerConfig::load_with(env(&[(key, value)])),
                Err(ConfigError::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_missing_toml_file() {
        assert!(matches!(
            ServerConfig::load_with(env(&[("SEALINK_SERVER_CONFIG", "/nonexistent/sealink.toml")])),
            Err(ConfigError::Io(_))
        ));
    }
}
