//! Error types for sealink core.
//!
//! Handshake errors abort the session; message errors abort only the message
//! they occurred on. Every error maps to an [`ErrorKind`] with a stable code
//! that is shown to users and carried in wire error bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sealink_crypto::channel::ChannelError;
use sealink_crypto::codec::CodecError;

// ============================================================================
// Error kinds
// ============================================================================

/// Stable classification of every failure the protocol can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeyGeneration,
    Registration,
    SignatureVerification,
    KeyUnwrap,
    Authentication,
    Decryption,
    Replay,
    Transport,
    InvalidState,
    Cancelled,
    Codec,
    SuiteMismatch,
    UnknownSession,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::KeyGeneration,
        ErrorKind::Registration,
        ErrorKind::SignatureVerification,
        ErrorKind::KeyUnwrap,
        ErrorKind::Authentication,
        ErrorKind::Decryption,
        ErrorKind::Replay,
        ErrorKind::Transport,
        ErrorKind::InvalidState,
        ErrorKind::Cancelled,
        ErrorKind::Codec,
        ErrorKind::SuiteMismatch,
        ErrorKind::UnknownSession,
        ErrorKind::Unavailable,
        ErrorKind::Internal,
    ];

    /// Stable string code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::KeyGeneration => "key_generation",
            ErrorKind::Registration => "registration",
            ErrorKind::SignatureVerification => "signature_verification",
            ErrorKind::KeyUnwrap => "key_unwrap",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Decryption => "decryption",
            ErrorKind::Replay => "replay",
            ErrorKind::Transport => "transport",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Codec => "codec",
            ErrorKind::SuiteMismatch => "suite_mismatch",
            ErrorKind::UnknownSession => "unknown_session",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// HTTP status used when this kind is reported over the wire.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Codec | ErrorKind::SuiteMismatch | ErrorKind::Registration => 400,
            ErrorKind::SignatureVerification | ErrorKind::Authentication => 401,
            ErrorKind::UnknownSession => 404,
            ErrorKind::InvalidState | ErrorKind::Replay => 409,
            ErrorKind::Decryption | ErrorKind::KeyUnwrap => 422,
            ErrorKind::Cancelled => 408,
            ErrorKind::Transport => 502,
            ErrorKind::Unavailable => 503,
            ErrorKind::KeyGeneration | ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Wire error body: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(&self.code)
    }
}

// ============================================================================
// Handshake errors
// ============================================================================

/// Errors that abort a handshake and move it to `Failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl HandshakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandshakeError::KeyGeneration(_) => ErrorKind::KeyGeneration,
            HandshakeError::Registration(_) => ErrorKind::Registration,
            HandshakeError::SignatureVerification(_) => ErrorKind::SignatureVerification,
            HandshakeError::KeyUnwrap(_) => ErrorKind::KeyUnwrap,
            HandshakeError::Transport(_) => ErrorKind::Transport,
            HandshakeError::InvalidState(_) => ErrorKind::InvalidState,
            HandshakeError::Cancelled(_) => ErrorKind::Cancelled,
            HandshakeError::Codec(_) => ErrorKind::Codec,
        }
    }
}

// ============================================================================
// Message errors
// ============================================================================

/// Errors on a single application message. The session survives them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message authentication failed")]
    Authentication,

    #[error("message decryption failed")]
    Decryption,

    #[error("message replayed")]
    Replay,

    #[error("message encryption failed: {0}")]
    Encryption(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl MessageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessageError::Authentication => ErrorKind::Authentication,
            MessageError::Decryption => ErrorKind::Decryption,
            MessageError::Replay => ErrorKind::Replay,
            MessageError::Encryption(_) => ErrorKind::Internal,
            MessageError::Transport(_) => ErrorKind::Transport,
            MessageError::InvalidState(_) => ErrorKind::InvalidState,
            MessageError::Codec(_) => ErrorKind::Codec,
        }
    }
}

impl From<ChannelError> for MessageError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Authentication => MessageError::Authentication,
            ChannelError::Decryption => MessageError::Decryption,
            ChannelError::Replay => MessageError::Replay,
            ChannelError::Exhausted => MessageError::InvalidState("channel key must be replaced".into()),
            other => MessageError::Encryption(other.to_string()),
        }
    }
}

// ============================================================================
// Responder errors
// ============================================================================

/// Errors reported by the server-side responder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("{0}")]
    SuiteMismatch(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("unknown session")]
    UnknownSession,

    #[error("session limit reached ({0} sessions)")]
    SessionLimit(usize),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("message authentication failed")]
    Authentication,

    #[error("message decryption failed")]
    Decryption,

    #[error("message replayed")]
    Replay,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResponderError::SuiteMismatch(_) => ErrorKind::SuiteMismatch,
            ResponderError::Malformed(_) => ErrorKind::Codec,
            ResponderError::SignatureVerification => ErrorKind::SignatureVerification,
            ResponderError::UnknownSession => ErrorKind::UnknownSession,
            ResponderError::SessionLimit(_) => ErrorKind::Unavailable,
            ResponderError::InvalidState(_) => ErrorKind::InvalidState,
            ResponderError::Authentication => ErrorKind::Authentication,
            ResponderError::Decryption => ErrorKind::Decryption,
            ResponderError::Replay => ErrorKind::Replay,
            ResponderError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wire-safe body. Internal details are not exposed to the peer.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            ResponderError::Internal(_) => ErrorBody::new(ErrorKind::Internal, "internal error"),
            other => ErrorBody::new(other.kind(), other.to_string()),
        }
    }
}

impl From<CodecError> for ResponderError {
    fn from(e: CodecError) -> Self {
        ResponderError::Malformed(e.to_string())
    }
}

impl From<ChannelError> for ResponderError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Authentication => ResponderError::Authentication,
            ChannelError::Decryption => ResponderError::Decryption,
            ChannelError::Replay => ResponderError::Replay,
            ChannelError::Exhausted => {
                ResponderError::InvalidState("session key must be re-issued".into())
            }
            other => ResponderError::Internal(other.to_string()),
        }
    }
}
