//! sealink-server: HTTP responder for the sealink handshake
//!
//! Serves signed identity proofs, accepts client registrations, issues
//! wrapped session keys and stores the latest client message per session.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::SealinkServer;
