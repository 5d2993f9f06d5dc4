//! Handshake against servers that misbehave.
//!
//! `FakeServer` speaks the protocol with its own keys so individual steps can
//! be corrupted while everything else stays valid.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use sealink_core::harness::{client_config, loopback};
use sealink_core::messages::{EnvelopeMessage, KeyMaterial, MessageAck, RegisterAck, RegisterRequest, ServerIdentity};
use sealink_core::transcript::{identity_payload, key_material_transcript};
use sealink_core::{
    ClientHandshake, ErrorKind, HandshakeError, HandshakeTransport, LoopbackTransport, TransportError,
};
use sealink_crypto::codec::{self, SignedText};
use sealink_crypto::nonce::{random_nonce, FRESHNESS_NONCE_LEN, WRAP_NONCE_LEN};
use sealink_crypto::{CipherSuite, KeyManager, SigningKeypair, SymmetricKey};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Follows the protocol.
    Honest,
    /// Signs the wrapped key before the wrap nonce.
    Reordered,
    /// Wraps the key for someone other than the client.
    WrapForStranger,
    /// Signs the identity proof over the raw nonce bytes.
    RawNonceIdentity,
}

struct FakeServer {
    mode: Mode,
    keys: KeyManager,
    identity: SigningKeypair,
    client_box: Mutex<Option<Vec<u8>>>,
}

impl FakeServer {
    fn new(mode: Mode) -> Arc<Self> {
        let keys = KeyManager::new(CipherSuite::curve25519());
        let identity = keys.generate_signing_keypair().unwrap();
        Arc::new(Self {
            mode,
            keys,
            identity,
            client_box: Mutex::new(None),
        })
    }
}

fn unsupported() -> TransportError {
    TransportError::Connection("not served".into())
}

#[async_trait]
impl HandshakeTransport for FakeServer {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        let nonce = random_nonce::<FRESHNESS_NONCE_LEN>().unwrap();
        let signed = if self.mode == Mode::RawNonceIdentity {
            nonce.to_vec()
        } else {
            identity_payload(&nonce).as_bytes().to_vec()
        };
        Ok(ServerIdentity {
            sign_public_key: codec::encode(&self.identity.export_public()),
            nonce: codec::encode(&nonce),
            signature: codec::encode(&self.identity.sign(&signed).unwrap()),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        let box_key = codec::decode("boxPublicKey", &request.box_public_key).unwrap();
        *self.client_box.lock().unwrap() = Some(box_key);
        Ok(RegisterAck {
            session_id: Uuid::new_v4(),
        })
    }

    async fn fetch_key_material(&self, _session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        let client_box = self.client_box.lock().unwrap().clone().ok_or_else(unsupported)?;
        let agreement = self.keys.generate_agreement_keypair().unwrap();
        let recipient = if self.mode == Mode::WrapForStranger {
            self.keys.generate_agreement_keypair().unwrap().public_key()
        } else {
            self.keys.parse_agreement_public(&client_box).unwrap()
        };

        let key = SymmetricKey::generate(self.keys.suite().aead).unwrap();
        let wrap_nonce = random_nonce::<WRAP_NONCE_LEN>().unwrap();
        let wrapped = agreement.wrap_key(&recipient, &key, &wrap_nonce).unwrap();
        let server_box = agreement.export_public();

        let transcript = if self.mode == Mode::Reordered {
            let mut t = SignedText::new();
            t.append_bytes(&wrapped)
                .append_bytes(&wrap_nonce)
                .append_bytes(&server_box)
                .append_bytes(&client_box);
            t
        } else {
            key_material_transcript(&wrap_nonce, &wrapped, &server_box, &client_box, None)
        };

        Ok(KeyMaterial {
            server_sign_public_key: codec::encode(&self.identity.export_public()),
            server_box_public_key: codec::encode(&server_box),
            wrap_nonce: codec::encode(&wrap_nonce),
            wrapped_key: codec::encode(&wrapped),
            greeting: None,
            signature: codec::encode(&self.identity.sign(transcript.as_bytes()).unwrap()),
        })
    }

    async fn submit_message(
        &self,
        _session_id: Uuid,
        _message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        Err(unsupported())
    }

    async fn fetch_message(&self, _session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        Err(unsupported())
    }

    async fn close(&self, _session_id: Uuid) -> Result<(), TransportError> {
        Err(unsupported())
    }
}

async fn run_against(mode: Mode) -> (Result<(), HandshakeError>, bool) {
    let mut hs = ClientHandshake::new(FakeServer::new(mode), client_config(CipherSuite::curve25519())).unwrap();
    let result = hs.run().await;
    let no_key = hs.session().shared_symmetric_key.is_none();
    (result, no_key)
}

#[tokio::test]
async fn honest_fake_server_completes() {
    let (result, no_key) = run_against(Mode::Honest).await;
    result.unwrap();
    assert!(!no_key);
}

#[tokio::test]
async fn reordered_transcript_fails_verification() {
    let (result, no_key) = run_against(Mode::Reordered).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::SignatureVerification);
    assert!(no_key);
}

#[tokio::test]
async fn raw_nonce_identity_proof_fails_verification() {
    let (result, _) = run_against(Mode::RawNonceIdentity).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::SignatureVerification);
}

#[tokio::test]
async fn key_wrapped_for_stranger_fails_unwrap() {
    let (result, no_key) = run_against(Mode::WrapForStranger).await;
    assert!(matches!(result, Err(HandshakeError::KeyUnwrap(_))));
    assert!(no_key);
}

/// Rewrites key material in transit.
struct Interceptor {
    inner: Arc<LoopbackTransport>,
    rewrite: Box<dyn Fn(&mut KeyMaterial) + Send + Sync>,
}

#[async_trait]
impl HandshakeTransport for Interceptor {
    async fn fetch_server_identity(&self) -> Result<ServerIdentity, TransportError> {
        self.inner.fetch_server_identity().await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, TransportError> {
        self.inner.register(request).await
    }

    async fn fetch_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, TransportError> {
        let mut material = self.inner.fetch_key_material(session_id).await?;
        (self.rewrite)(&mut material);
        Ok(material)
    }

    async fn submit_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, TransportError> {
        self.inner.submit_message(session_id, message).await
    }

    async fn fetch_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, TransportError> {
        self.inner.fetch_message(session_id).await
    }

    async fn close(&self, session_id: Uuid) -> Result<(), TransportError> {
        self.inner.close(session_id).await
    }
}

async fn run_intercepted(rewrite: Box<dyn Fn(&mut KeyMaterial) + Send + Sync>) -> HandshakeError {
    let suite = CipherSuite::curve25519();
    let (_responder, inner) = loopback(suite).unwrap();
    let transport = Arc::new(Interceptor { inner, rewrite });
    let mut hs = ClientHandshake::new(transport, client_config(suite)).unwrap();
    let err = hs.run().await.unwrap_err();
    assert!(hs.state().is_failed());
    assert!(hs.session().shared_symmetric_key.is_none());
    err
}

#[tokio::test]
async fn substituted_server_box_key_is_rejected() {
    let attacker = KeyManager::new(CipherSuite::curve25519())
        .generate_agreement_keypair()
        .unwrap()
        .export_public();
    let err = run_intercepted(Box::new(move |m| {
        m.server_box_public_key = codec::encode(&attacker);
    }))
    .await;
    assert_eq!(err.kind(), ErrorKind::SignatureVerification);
}

#[tokio::test]
async fn substituted_signing_key_is_rejected() {
    let attacker = KeyManager::new(CipherSuite::curve25519())
        .generate_signing_keypair()
        .unwrap();
    let attacker_pub = attacker.export_public();
    let err = run_intercepted(Box::new(move |m| {
        m.server_sign_public_key = codec::encode(&attacker_pub);
    }))
    .await;
    assert_eq!(err.kind(), ErrorKind::SignatureVerification);
}

#[tokio::test]
async fn stripped_greeting_is_rejected() {
    let err = run_intercepted(Box::new(|m| {
        m.greeting = None;
    }))
    .await;
    assert_eq!(err.kind(), ErrorKind::SignatureVerification);
}

#[tokio::test]
async fn non_canonical_base64_is_rejected() {
    let err = run_intercepted(Box::new(|m| {
        m.wrap_nonce = m.wrap_nonce.trim_end_matches('=').to_string() + "!";
    }))
    .await;
    assert_eq!(err.kind(), ErrorKind::Codec);
}
