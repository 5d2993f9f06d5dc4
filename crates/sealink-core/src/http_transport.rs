//! HTTP transport to a sealink server.
//!
//! Each [`HandshakeTransport`] method is one JSON request against the
//! `/v1` routes. Any status other than the expected one becomes
//! [`TransportError::Rejected`], carrying the server's error kind when the
//! body parses as an [`ErrorBody`].

#![cfg(feature = "http")]

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::errors::{ErrorBody, ErrorKind};
use crate::messages::{EnvelopeMessage, KeyMaterial, MessageAck, RegisterAck, RegisterRequest, ServerIdentity};
use crate::transport::{HandshakeTransport, TransportError};

/// JSON-over-HTTP transport against a sealink server.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, session_id: Uuid, suffix: &str) -> String {
        format!("{}/v1/sessions/{}{}", self.base_url, session_id, suffix)
    }
}

async fn expect_json<T: DeserializeOwned>(resp: Response, expected: StatusCode) -> Result<T, TransportError> {
    if resp.status() != expected {
        return Err(rejection(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

/// Turn a non-success response into `Rejected`, keeping the server's body.
async fn rejection(resp: Response) -> TransportError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => TransportError::rejected(status, body),
        Err(_) => TransportError::Rejected {
            status,
            kind: None,
            message: if text.is_empty() {
                format!("status={}", status)
            } else {
                text
            },
        },
    }
}

fn connection(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Rejected {
            status: 408,
            kind: Some(ErrorKind::Cancelled),
            message: e.to_string(),
        }
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[async_trait]
impl HandshakeTransport for HttpTransport {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        let resp = self
            .client
            .get(self.url("/v1/identity"))
            .send()
            .await
            .map_err(connection)?;
        expect_json(resp, StatusCode::OK).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        let resp = self
            .client
            .post(self.url("/v1/sessions"))
            .json(request)
            .send()
            .await
            .map_err(connection)?;
        expect_json(resp, StatusCode::CREATED).await
    }

    async fn fetch_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        let resp = self
            .client
            .get(self.session_url(session_id, "/key-material"))
            .send()
            .await
            .map_err(connection)?;
        expect_json(resp, StatusCode::OK).await
    }

    async fn submit_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        let resp = self
            .client
            .post(self.session_url(session_id, "/messages"))
            .json(message)
            .send()
            .await
            .map_err(connection)?;
        expect_json(resp, StatusCode::ACCEPTED).await
    }

    /// Returns `None` on 204.
    async fn fetch_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        let resp = self
            .client
            .get(self.session_url(session_id, "/messages/latest"))
            .send()
            .await
            .map_err(connection)?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => resp
                .json::<EnvelopeMessage>()
                .await
                .map(Some)
                .map_err(|e| TransportError::InvalidResponse(e.to_string())),
            _ => Err(rejection(resp).await),
        }
    }

    async fn close(&self, session_id: Uuid) -> Result<(), TransportError> {
        let resp = self
            .client
            .delete(self.session_url(session_id, ""))
            .send()
            .await
            .map_err(connection)?;
        if resp.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(rejection(resp).await)
        }
    }
}
