//! Helpers for exercising a full client/responder exchange in-process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use sealink_crypto::CipherSuite;

use crate::errors::{HandshakeError, MessageError, ResponderError};
use crate::handshake::{connect, EstablishedSession, HandshakeConfig};
use crate::messages::{EnvelopeMessage, KeyMaterial, MessageAck, RegisterAck, RegisterRequest, ServerIdentity};
use crate::responder::{Responder, ResponderConfig};
use crate::transport::{HandshakeTransport, LoopbackTransport, TransportError};
use crate::ui::{run_exchange, MemoryUi};

/// Errors from [`run_message_flow`].
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Responder(#[from] ResponderError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("flow check failed: {0}")]
    Check(String),
}

/// Responder and a loopback transport to it, both under `suite`.
pub fn loopback(suite: CipherSuite) -> Result<(Arc<Responder>, Arc<LoopbackTransport>), ResponderError> {
    let responder = Arc::new(Responder::new(ResponderConfig {
        suite,
        ..ResponderConfig::default()
    })?);
    let transport = Arc::new(LoopbackTransport::new(Arc::clone(&responder)));
    Ok((responder, transport))
}

/// Client settings under `suite` with a short round-trip timeout.
pub fn client_config(suite: CipherSuite) -> HandshakeConfig {
    HandshakeConfig {
        suite,
        round_trip_timeout: Duration::from_secs(30),
        ..HandshakeConfig::default()
    }
}

/// Handshake, check both sides hold the same key, send `message`, and return
/// what the responder stored.
pub async fn run_message_flow(suite: CipherSuite, message: &str) -> Result<String, FlowError> {
    let (responder, transport) = loopback(suite)?;
    let mut session: EstablishedSession<LoopbackTransport> =
        connect(transport, client_config(suite)).await?;

    let handle = responder
        .session(session.session_id())
        .await
        .ok_or_else(|| FlowError::Check("responder lost the session".into()))?;
    {
        let server = handle.lock().await;
        let server_key = server
            .state()
            .shared_symmetric_key
            .as_ref()
            .ok_or_else(|| FlowError::Check("responder has no key".into()))?;
        if !server_key.ct_eq(session.shared_key()) {
            return Err(FlowError::Check("keys differ".into()));
        }
    }

    let mut ui = MemoryUi::with_outbound([message]);
    run_exchange(&mut session, &mut ui).await?;

    let stored = handle.lock().await.stored_message().map(str::to_string);
    session.close().await?;
    stored.ok_or_else(|| FlowError::Check("responder stored nothing".into()))
}

/// Transport whose round trips never complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct StalledTransport;

#[async_trait]
impl HandshakeTransport for StalledTransport {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        std::future::pending().await
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        std::future::pending().await
    }

    async fn fetch_key_material(&self, _session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        std::future::pending().await
    }

    async fn submit_message(
        &self,
        _session_id: Uuid,
        _message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        std::future::pending().await
    }

    async fn fetch_message(&self, _session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        std::future::pending().await
    }

    async fn close(&self, _session_id: Uuid) -> Result<(), TransportError> {
        std::future::pending().await
    }
}
