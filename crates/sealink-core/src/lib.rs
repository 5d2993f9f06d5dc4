//! sealink core: the signed handshake and the secure messaging session.
//!
//! This crate implements:
//! - The client handshake state machine and its pure verification steps
//! - The server-side responder with per-session isolation
//! - JSON wire messages and the exact texts each signature covers
//! - The transport trait with loopback and HTTP implementations
//! - The UI surface an exchange reports to

#![forbid(unsafe_code)]

pub mod errors;
pub mod handshake;
pub mod harness;
pub mod messages;
pub mod responder;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod ui;

#[cfg(feature = "http")]
pub mod http_transport;

#[cfg(test)]
mod proptests;

pub use errors::{ErrorBody, ErrorKind, HandshakeError, MessageError, ResponderError};
pub use handshake::{connect, ClientHandshake, EstablishedSession, HandshakeConfig, HandshakeState};
pub use responder::{Responder, ResponderConfig};
pub use session::SessionState;
pub use transport::{HandshakeTransport, LoopbackTransport, TransportError};
pub use ui::{run_exchange, MemoryUi, UiSurface};

#[cfg(feature = "http")]
pub use http_transport::HttpTransport;
