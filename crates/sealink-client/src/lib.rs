//! sealink client - command-line front end for the sealink handshake
//!
//! This crate provides:
//! - A TOML configuration with command-line overrides
//! - The identity, send and chat flows over HTTP
//! - A terminal implementation of the UI surface
//! - One process exit code per failure kind

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod exchange;
pub mod terminal;

use sealink_core::ErrorKind;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use terminal::TerminalUi;

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Invalid input (configuration or arguments)
/// - 10-24: one code per protocol failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidInput = 2,
    KeyGeneration = 10,
    Registration = 11,
    SignatureVerification = 12,
    KeyUnwrap = 13,
    Authentication = 14,
    Decryption = 15,
    Replay = 16,
    Transport = 17,
    InvalidState = 18,
    Cancelled = 19,
    Codec = 20,
    SuiteMismatch = 21,
    UnknownSession = 22,
    Internal = 23,
    Unavailable = 24,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code reported for a protocol failure
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::KeyGeneration => ExitCode::KeyGeneration,
            ErrorKind::Registration => ExitCode::Registration,
            ErrorKind::SignatureVerification => ExitCode::SignatureVerification,
            ErrorKind::KeyUnwrap => ExitCode::KeyUnwrap,
            ErrorKind::Authentication => ExitCode::Authentication,
            ErrorKind::Decryption => ExitCode::Decryption,
            ErrorKind::Replay => ExitCode::Replay,
            ErrorKind::Transport => ExitCode::Transport,
            ErrorKind::InvalidState => ExitCode::InvalidState,
            ErrorKind::Cancelled => ExitCode::Cancelled,
            ErrorKind::Codec => ExitCode::Codec,
            ErrorKind::SuiteMismatch => ExitCode::SuiteMismatch,
            ErrorKind::UnknownSession => ExitCode::UnknownSession,
            ErrorKind::Internal => ExitCode::Internal,
            ErrorKind::Unavailable => ExitCode::Unavailable,
        }
    }

    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::KeyGeneration => "KEY_GENERATION",
            ExitCode::Registration => "REGISTRATION",
            ExitCode::SignatureVerification => "SIGNATURE_VERIFICATION",
            ExitCode::KeyUnwrap => "KEY_UNWRAP",
            ExitCode::Authentication => "AUTHENTICATION",
            ExitCode::Decryption => "DECRYPTION",
            ExitCode::Replay => "REPLAY",
            ExitCode::Transport => "TRANSPORT",
            ExitCode::InvalidState => "INVALID_STATE",
            ExitCode::Cancelled => "CANCELLED",
            ExitCode::Codec => "CODEC",
            ExitCode::SuiteMismatch => "SUITE_MISMATCH",
            ExitCode::UnknownSession => "UNKNOWN_SESSION",
            ExitCode::Internal => "INTERNAL",
            ExitCode::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}
