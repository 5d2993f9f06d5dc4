//! Transport abstraction for the client side of the protocol.
//!
//! A transport carries the JSON wire messages of each round trip. It is
//! oblivious to their cryptographic content.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::{ErrorBody, ErrorKind, ResponderError};
use crate::messages::{EnvelopeMessage, KeyMaterial, MessageAck, RegisterAck, RegisterRequest, ServerIdentity};
use crate::responder::Responder;

/// Errors from a transport round trip.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the peer.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The peer answered with an error.
    #[error("rejected by peer ({status}): {message}")]
    Rejected {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },

    /// The peer answered with something that is not the expected message.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn rejected(status: u16, body: ErrorBody) -> Self {
        TransportError::Rejected {
            status,
            kind: body.kind(),
            message: body.message,
        }
    }

    /// Error kind reported by the peer, if any.
    pub fn peer_kind(&self) -> Option<ErrorKind> {
        match self {
            TransportError::Rejected { kind, .. } => *kind,
            _ => None,
        }
    }
}

impl From<ResponderError> for TransportError {
    fn from(e: ResponderError) -> Self {
        let kind = e.kind();
        TransportError::rejected(kind.http_status(), e.to_body())
    }
}

/// Round trips the client makes against a responder.
#[async_trait]
pub trait HandshakeTransport: Send + Sync {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError>;

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError>;

    async fn fetch_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, TransportError>;

    async fn submit_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError>;

    /// Latest server message, `None` if the server has nothing to send.
    async fn fetch_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError>;

    async fn close(&self, session_id: Uuid) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: HandshakeTransport + ?Sized> HandshakeTransport for Arc<T> {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        (**self).fetch_server_identity().await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        (**self).register(request).await
    }

    async fn fetch_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        (**self).fetch_key_material(session_id).await
    }

    async fn submit_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        (**self).submit_message(session_id, message).await
    }

    async fn fetch_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        (**self).fetch_message(session_id).await
    }

    async fn close(&self, session_id: Uuid) -> Result<(), TransportError> {
        (**self).close(session_id).await
    }
}

/// In-process transport that calls a [`Responder`] directly.
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    responder: Arc<Responder>,
}

impl LoopbackTransport {
    pub fn new(responder: Arc<Responder>) -> Self {
        Self { responder }
    }

    pub fn responder(&self) -> &Arc<Responder> {
        &self.responder
    }
}

#[async_trait]
impl HandshakeTransport for LoopbackTransport {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        Ok(self.responder.identity_proof()?)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        Ok(self.responder.register(request).await?)
    }

    async fn fetch_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        Ok(self.responder.issue_key_material(session_id).await?)
    }

    async fn submit_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        Ok(self.responder.receive_message(session_id, message).await?)
    }

    async fn fetch_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        Ok(self.responder.latest_message(session_id).await?)
    }

    async fn close(&self, session_id: Uuid) -> Result<(), TransportError> {
        Ok(self.responder.close(session_id).await?)
    }
}
