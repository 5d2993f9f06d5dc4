//! Cipher suite selection.
//!
//! A deployment fixes one signature scheme, one key-wrap scheme and one AEAD.
//! The suite is carried in the registration request as its canonical string
//! (`"ed25519+x25519-box+aes256gcm"`), and the responder refuses any suite
//! other than its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error type for suite parsing and negotiation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuiteError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("malformed suite string: {0}")]
    Malformed(String),
    #[error("suite mismatch: expected {expected}, offered {offered}")]
    Mismatch { expected: String, offered: String },
}

/// Signature scheme used for identity proofs, transcripts and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    Ed25519,
    /// RSASSA-PSS with SHA-256
    RsaPss,
}

/// Scheme used to wrap the shared symmetric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyWrapScheme {
    /// X25519 + HKDF-SHA256 + ChaCha20-Poly1305 sealed box
    X25519Box,
    /// RSAES-OAEP with SHA-256
    RsaOaep,
}

/// AEAD used by the secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl SignatureScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureScheme::Ed25519 => "ed25519",
            SignatureScheme::RsaPss => "rsa-pss-sha256",
        }
    }
}

impl KeyWrapScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyWrapScheme::X25519Box => "x25519-box",
            KeyWrapScheme::RsaOaep => "rsa-oaep-sha256",
        }
    }
}

impl AeadAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            AeadAlgorithm::Aes256Gcm => "aes256gcm",
            AeadAlgorithm::ChaCha20Poly1305 => "chacha20poly1305",
        }
    }
}

impl FromStr for SignatureScheme {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(SignatureScheme::Ed25519),
            "rsa-pss-sha256" => Ok(SignatureScheme::RsaPss),
            other => Err(SuiteError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl FromStr for KeyWrapScheme {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x25519-box" => Ok(KeyWrapScheme::X25519Box),
            "rsa-oaep-sha256" => Ok(KeyWrapScheme::RsaOaep),
            other => Err(SuiteError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl FromStr for AeadAlgorithm {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes256gcm" => Ok(AeadAlgorithm::Aes256Gcm),
            "chacha20poly1305" => Ok(AeadAlgorithm::ChaCha20Poly1305),
            other => Err(SuiteError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// The full algorithm selection for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CipherSuite {
    pub signature: SignatureScheme,
    pub key_wrap: KeyWrapScheme,
    pub aead: AeadAlgorithm,
}

impl CipherSuite {
    pub const fn new(signature: SignatureScheme, key_wrap: KeyWrapScheme, aead: AeadAlgorithm) -> Self {
        Self {
            signature,
            key_wrap,
            aead,
        }
    }

    /// Ed25519 signatures, X25519 box wrapping, AES-256-GCM messages.
    pub const fn curve25519() -> Self {
        Self::new(
            SignatureScheme::Ed25519,
            KeyWrapScheme::X25519Box,
            AeadAlgorithm::Aes256Gcm,
        )
    }

    /// RSA-PSS signatures, RSA-OAEP wrapping, AES-256-GCM messages.
    pub const fn rsa() -> Self {
        Self::new(
            SignatureScheme::RsaPss,
            KeyWrapScheme::RsaOaep,
            AeadAlgorithm::Aes256Gcm,
        )
    }

    /// Reject any offered suite that differs from ours.
    pub fn ensure_matches(&self, offered: &CipherSuite) -> Result<(), SuiteError> {
        if self != offered {
            return Err(SuiteError::Mismatch {
                expected: self.to_string(),
                offered: offered.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CipherSuite {
    fn default() -> Self {
        Self::curve25519()
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}+{}",
            self.signature.as_str(),
            self.key_wrap.as_str(),
            self.aead.as_str()
        )
    }
}

impl FromStr for CipherSuite {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('+').collect();
        let [sig, wrap, aead] = parts.as_slice() else {
            return Err(SuiteError::Malformed(s.to_string()));
        };
        Ok(Self {
            signature: sig.parse()?,
            key_wrap: wrap.parse()?,
            aead: aead.parse()?,
        })
    }
}

impl TryFrom<String> for CipherSuite {
    type Error = SuiteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CipherSuite> for String {
    fn from(suite: CipherSuite) -> Self {
        suite.to_string()
    }
}
