//! HTTP API endpoints

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, Router},
    Json,
};
use tracing::{error, warn};
use uuid::Uuid;

use sealink_core::messages::{EnvelopeMessage, RegisterRequest};
use sealink_core::{Responder, ResponderError};

#[derive(Clone)]
pub struct ApiState {
    pub responder: Arc<Responder>,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/identity", get(get_identity))
        .route("/v1/sessions", post(register_session))
        .route("/v1/sessions/:session_id", axum::routing::delete(close_session))
        .route("/v1/sessions/:session_id/key-material", get(get_key_material))
        .route("/v1/sessions/:session_id/messages", post(post_message))
        .route("/v1/sessions/:session_id/messages/latest", get(get_latest_message))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Responder failure rendered as `{code, message}` with the kind's status.
pub struct ApiError(pub ResponderError);

impl From<ResponderError> for ApiError {
    fn from(e: ResponderError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(ResponderError::Malformed(e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = kind.code(), error = %self.0, "request failed");
        } else {
            warn!(code = kind.code(), error = %self.0, "request rejected");
        }
        (status, Json(self.0.to_body())).into_response()
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError(ResponderError::Malformed(format!("session id: {}", e))))
}

/// GET /v1/identity - Fresh signed identity proof
async fn get_identity(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let identity = state.responder.identity_proof()?;
    Ok(Json(identity).into_response())
}

/// POST /v1/sessions - Register a client
async fn register_session(
    State(state): State<ApiState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let ack = state.responder.register(&request).await?;
    Ok((StatusCode::CREATED, Json(ack)).into_response())
}

/// GET /v1/sessions/{id}/key-material - Wrapped key and signed transcript
async fn get_key_material(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let material = state.responder.issue_key_material(session_id).await?;
    Ok(Json(material).into_response())
}

/// POST /v1/sessions/{id}/messages - Client envelope
async fn post_message(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    body: Result<Json<EnvelopeMessage>, JsonRejection>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let Json(message) = body?;
    let ack = state.responder.receive_message(session_id, &message).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)).into_response())
}

/// GET /v1/sessions/{id}/messages/latest - Stored message sealed for the client
async fn get_latest_message(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    match state.responder.latest_message(session_id).await? {
        Some(envelope) => Ok(Json(envelope).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// DELETE /v1/sessions/{id}
async fn close_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    state.responder.close(session_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /health - Health check
async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use sealink_core::{ErrorBody, ErrorKind, ResponderConfig};
    use tower::ServiceExt;

    fn app() -> (Arc<Responder>, Router) {
        let responder = Arc::new(Responder::new(ResponderConfig::default()).unwrap());
        let router = create_router(ApiState {
            responder: Arc::clone(&responder),
        });
        (responder, router)
    }

    fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn error_body(resp: Response) -> ErrorBody {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = app();
        let resp = app.oneshot(request(Method::GET, "/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_identity_is_fresh_each_time() {
        let (_, app) = app();
        let first = app
            .clone()
            .oneshot(request(Method::GET, "/v1/identity", None))
            .await
            .unwrap();
        let second = app
            .oneshot(request(Method::GET, "/v1/identity", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let first: serde_json::Value =
            serde_json::from_slice(&to_bytes(first.into_body(), usize::MAX).await.unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_slice(&to_bytes(second.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(first["signPublicKey"], second["signPublicKey"]);
        assert_ne!(first["nonce"], second["nonce"]);
    }

    #[tokio::test]
    async fn test_malformed_registration_is_codec_error() {
        let (responder, app) = app();
        let resp = app
            .oneshot(request(Method::POST, "/v1/sessions", Some("{\"suite\": 7}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await.kind(), Some(ErrorKind::Codec));
        assert_eq!(responder.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_bad_registration_signature() {
        let (responder, app) = app();
        let keys = sealink_crypto::KeyManager::new(responder.suite());
        let signing = keys.generate_signing_keypair().unwrap();
        let agreement = keys.generate_agreement_keypair().unwrap();
        let body = serde_json::json!({
            "suite": responder.suite().to_string(),
            "signPublicKey": sealink_crypto::codec::encode(&signing.export_public()),
            "boxPublicKey": sealink_crypto::codec::encode(&agreement.export_public()),
            "signature": sealink_crypto::codec::encode(&signing.sign(b"something else").unwrap()),
        });
        let resp = app
            .oneshot(request(Method::POST, "/v1/sessions", Some(&body.to_string())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_body(resp).await.kind(),
            Some(ErrorKind::SignatureVerification)
        );
    }

    fn registration_body(suite: sealink_crypto::CipherSuite) -> String {
        let keys = sealink_crypto::KeyManager::new(suite);
        let signing = keys.generate_signing_keypair().unwrap();
        let box_public = keys.generate_agreement_keypair().unwrap().export_public();
        let signed = sealink_core::transcript::registration_payload(&box_public);
        serde_json::json!({
            "suite": suite.to_string(),
            "signPublicKey": sealink_crypto::codec::encode(&signing.export_public()),
            "boxPublicKey": sealink_crypto::codec::encode(&box_public),
            "signature": sealink_crypto::codec::encode(&signing.sign(signed.as_bytes()).unwrap()),
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_registration_past_session_limit() {
        let responder = Arc::new(
            Responder::new(ResponderConfig {
                max_sessions: 1,
                ..ResponderConfig::default()
            })
            .unwrap(),
        );
        let app = create_router(ApiState {
            responder: Arc::clone(&responder),
        });

        let first = registration_body(responder.suite());
        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/v1/sessions", Some(&first)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let second = registration_body(responder.suite());
        let resp = app
            .oneshot(request(Method::POST, "/v1/sessions", Some(&second)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_body(resp).await.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(responder.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_suite_mismatch() {
        let (_, app) = app();
        let body = serde_json::json!({
            "suite": "ed25519+x25519-box+chacha20poly1305",
            "signPublicKey": "",
            "boxPublicKey": "",
            "signature": "",
        });
        let resp = app
            .oneshot(request(Method::POST, "/v1/sessions", Some(&body.to_string())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await.kind(), Some(ErrorKind::SuiteMismatch));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (_, app) = app();
        let uri = format!("/v1/sessions/{}/key-material", Uuid::new_v4());
        let resp = app.clone().oneshot(request(Method::GET, &uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(resp).await.kind(), Some(ErrorKind::UnknownSession));

        let uri = format!("/v1/sessions/{}", Uuid::new_v4());
        let resp = app.oneshot(request(Method::DELETE, &uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let (_, app) = app();
        let resp = app
            .oneshot(request(Method::GET, "/v1/sessions/not-a-uuid/messages/latest", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await.kind(), Some(ErrorKind::Codec));
    }
}
