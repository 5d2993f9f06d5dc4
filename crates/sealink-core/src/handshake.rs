//! Client handshake state machine.
//!
//! ```text
//! INIT ──register──▶ REGISTERED ──verify──▶ PEER_VERIFIED ──unwrap──▶ KEY_ESTABLISHED
//!   │                    │                        │
//!   └────────────────────┴────────────────────────┴──────▶ FAILED
//! ```
//!
//! The verification steps are plain functions that take a [`SessionState`]
//! by value and hand it back populated. [`ClientHandshake`] drives them over
//! a [`HandshakeTransport`], bounding every round trip with a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use sealink_crypto::channel::EncryptedEnvelope;
use sealink_crypto::codec;
use sealink_crypto::keys::DEFAULT_RSA_BITS;
use sealink_crypto::nonce::{FRESHNESS_NONCE_LEN, WRAP_NONCE_LEN};
use sealink_crypto::utils::{constant_time_compare, fingerprint};
use sealink_crypto::{
    AgreementKeypair, AgreementPublicKey, CipherSuite, KeyManager, SecureChannel, SigningKeypair,
    SymmetricKey,
};

use crate::errors::{ErrorKind, HandshakeError, MessageError};
use crate::messages::{EnvelopeMessage, KeyMaterial, RegisterRequest, ServerIdentity};
use crate::session::SessionState;
use crate::transcript::{identity_payload, key_material_transcript, registration_payload};
use crate::transport::{HandshakeTransport, TransportError};

/// Default bound on one round trip.
pub const DEFAULT_ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// States
// ============================================================================

/// State of the client handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    /// Fresh keys, nothing sent yet.
    Init,
    /// The server accepted our registration.
    Registered { session_id: Uuid },
    /// The server's key material signature verified.
    PeerVerified { session_id: Uuid },
    /// Shared key recovered; hand off to the secure channel.
    KeyEstablished { session_id: Uuid },
    /// Terminal until [`ClientHandshake::restart`].
    Failed { reason: HandshakeError },
}

impl HandshakeState {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeState::Init => "INIT",
            HandshakeState::Registered { .. } => "REGISTERED",
            HandshakeState::PeerVerified { .. } => "PEER_VERIFIED",
            HandshakeState::KeyEstablished { .. } => "KEY_ESTABLISHED",
            HandshakeState::Failed { .. } => "FAILED",
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            HandshakeState::Registered { session_id }
            | HandshakeState::PeerVerified { session_id }
            | HandshakeState::KeyEstablished { session_id } => Some(*session_id),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HandshakeState::Failed { .. })
    }
}

/// Client handshake settings.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub suite: CipherSuite,
    pub rsa_bits: usize,
    pub round_trip_timeout: Duration,
    /// Expected server signing key in wire form. When set, any other key is
    /// refused.
    pub pinned_server_key: Option<Vec<u8>>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            suite: CipherSuite::default(),
            rsa_bits: DEFAULT_RSA_BITS,
            round_trip_timeout: DEFAULT_ROUND_TRIP_TIMEOUT,
            pinned_server_key: None,
        }
    }
}

// ============================================================================
// Protocol steps
// ============================================================================

/// Key material whose signature has been checked but not yet unwrapped.
#[derive(Debug, Clone)]
pub struct VerifiedKeyMaterial {
    pub wrap_nonce: [u8; WRAP_NONCE_LEN],
    pub wrapped_key: Vec<u8>,
    pub greeting: Option<EncryptedEnvelope>,
}

/// Check the server identity proof and record the server signing key.
pub fn verify_server_identity(
    keys: &KeyManager,
    identity: &ServerIdentity,
    pinned: Option<&[u8]>,
    mut session: SessionState,
) -> Result<SessionState, HandshakeError> {
    let key_bytes = codec::decode("signPublicKey", &identity.sign_public_key)?;
    let nonce = codec::decode_array::<FRESHNESS_NONCE_LEN>("nonce", &identity.nonce)?;
    let signature = codec::decode("signature", &identity.signature)?;

    if let Some(pinned) = pinned {
        if !constant_time_compare(pinned, &key_bytes) {
            return Err(HandshakeError::SignatureVerification(
                "server key does not match the pinned key".into(),
            ));
        }
    }

    let server_key = keys
        .parse_signing_public(&key_bytes)
        .map_err(|e| HandshakeError::SignatureVerification(e.to_string()))?;
    server_key
        .verify(identity_payload(&nonce).as_bytes(), &signature)
        .map_err(|_| HandshakeError::SignatureVerification("identity proof".into()))?;

    session.peer_signing_public_key = Some(server_key);
    session.last_received_nonce = Some(nonce.to_vec());
    Ok(session)
}

/// Build the signed registration for our two keypairs.
pub fn build_registration(
    suite: CipherSuite,
    signing: &SigningKeypair,
    agreement: &AgreementKeypair,
) -> Result<RegisterRequest, HandshakeError> {
    let box_public = agreement.export_public();
    let signature = signing
        .sign(registration_payload(&box_public).as_bytes())
        .map_err(|e| HandshakeError::Registration(e.to_string()))?;
    Ok(RegisterRequest {
        suite,
        sign_public_key: codec::encode(&signing.export_public()),
        box_public_key: codec::encode(&box_public),
        signature: codec::encode(&signature),
    })
}

/// Check the key material signature against the server key recorded in
/// `session`. Nothing is unwrapped here.
pub fn verify_key_material(
    keys: &KeyManager,
    material: &KeyMaterial,
    own_agreement: &AgreementPublicKey,
    mut session: SessionState,
) -> Result<(SessionState, VerifiedKeyMaterial), HandshakeError> {
    let server_key = session.peer_signing_public_key.as_ref().ok_or_else(|| {
        HandshakeError::InvalidState("server identity has not been verified".into())
    })?;

    let advertised = codec::decode("serverSignPublicKey", &material.server_sign_public_key)?;
    if !constant_time_compare(&advertised, &server_key.to_bytes()) {
        return Err(HandshakeError::SignatureVerification(
            "key material is signed by a different server key".into(),
        ));
    }

    let server_box = codec::decode("serverBoxPublicKey", &material.server_box_public_key)?;
    let wrap_nonce = codec::decode_array::<WRAP_NONCE_LEN>("wrapNonce", &material.wrap_nonce)?;
    let wrapped_key = codec::decode("wrappedKey", &material.wrapped_key)?;
    let signature = codec::decode("signature", &material.signature)?;
    let greeting = material
        .greeting
        .as_ref()
        .map(EnvelopeMessage::to_envelope)
        .transpose()?;

    let transcript = key_material_transcript(
        &wrap_nonce,
        &wrapped_key,
        &server_box,
        &own_agreement.to_bytes(),
        greeting.as_ref(),
    );
    server_key
        .verify(transcript.as_bytes(), &signature)
        .map_err(|_| HandshakeError::SignatureVerification("key material transcript".into()))?;

    let server_agreement = keys
        .parse_agreement_public(&server_box)
        .map_err(|e| HandshakeError::SignatureVerification(e.to_string()))?;
    session.peer_encryption_public_key = Some(server_agreement);
    session.peer_verified = true;

    Ok((
        session,
        VerifiedKeyMaterial {
            wrap_nonce,
            wrapped_key,
            greeting,
        },
    ))
}

/// Unwrap the shared key from verified material.
pub fn establish_key(
    agreement: &AgreementKeypair,
    material: &VerifiedKeyMaterial,
    suite: CipherSuite,
    mut session: SessionState,
) -> Result<SessionState, HandshakeError> {
    if !session.peer_verified {
        return Err(HandshakeError::InvalidState("peer has not been verified".into()));
    }
    let server_agreement = session
        .peer_encryption_public_key
        .as_ref()
        .ok_or_else(|| HandshakeError::InvalidState("missing server box key".into()))?;

    let key = agreement
        .unwrap_key(server_agreement, &material.wrap_nonce, &material.wrapped_key, suite.aead)
        .map_err(|e| HandshakeError::KeyUnwrap(e.to_string()))?;
    session.shared_symmetric_key = Some(key);
    Ok(session)
}

// ============================================================================
// Driver
// ============================================================================

/// Drives the client side of the handshake over a transport.
pub struct ClientHandshake<T: HandshakeTransport> {
    transport: Arc<T>,
    config: HandshakeConfig,
    keys: KeyManager,
    signing: Arc<SigningKeypair>,
    agreement: AgreementKeypair,
    state: HandshakeState,
    session: SessionState,
    identity_verified: bool,
    verified: Option<VerifiedKeyMaterial>,
}

impl<T: HandshakeTransport> ClientHandshake<T> {
    /// Generate fresh keypairs and start in `Init`.
    pub fn new(transport: Arc<T>, config: HandshakeConfig) -> Result<Self, HandshakeError> {
        let keys = KeyManager::with_rsa_bits(config.suite, config.rsa_bits)
            .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?;
        let (signing, agreement) = generate_keypairs(&keys)?;
        Ok(Self {
            transport,
            config,
            keys,
            signing: Arc::new(signing),
            agreement,
            state: HandshakeState::Init,
            session: SessionState::new(),
            identity_verified: false,
            verified: None,
        })
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Our signing public key in wire form.
    pub fn signing_public_key(&self) -> Vec<u8> {
        self.signing.export_public()
    }

    /// Fetch and check the server identity proof. Stays in `Init`.
    pub async fn verify_identity(&mut self) -> Result<(), HandshakeError> {
        self.expect_init()?;
        let transport = Arc::clone(&self.transport);
        let identity = self
            .round_trip(transport.fetch_server_identity(), HandshakeError::Transport)
            .await?;

        let session = std::mem::take(&mut self.session);
        match verify_server_identity(
            &self.keys,
            &identity,
            self.config.pinned_server_key.as_deref(),
            session,
        ) {
            Ok(session) => {
                if let Some(server) = session.peer_signing_public_key.as_ref() {
                    debug!(server = %fingerprint(&server.to_bytes()), "server identity verified");
                }
                self.session = session;
                self.identity_verified = true;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `Init -> Registered`.
    pub async fn register(&mut self) -> Result<Uuid, HandshakeError> {
        self.expect_init()?;
        if !self.identity_verified {
            return Err(HandshakeError::InvalidState(
                "server identity must be verified before registering".into(),
            ));
        }

        let request = match build_registration(self.config.suite, &self.signing, &self.agreement) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        let transport = Arc::clone(&self.transport);
        let ack = self
            .round_trip(transport.register(&request), |e| {
                HandshakeError::Registration(e)
            })
            .await?;

        info!(session_id = %ack.session_id, "registered with server");
        self.state = HandshakeState::Registered {
            session_id: ack.session_id,
        };
        Ok(ack.session_id)
    }

    /// `Registered -> PeerVerified`.
    pub async fn verify_peer(&mut self) -> Result<(), HandshakeError> {
        let session_id = match &self.state {
            HandshakeState::Registered { session_id } => *session_id,
            other => {
                return Err(HandshakeError::InvalidState(format!(
                    "verify_peer called in {}",
                    other.name()
                )))
            }
        };

        let transport = Arc::clone(&self.transport);
        let material = self
            .round_trip(transport.fetch_key_material(session_id), HandshakeError::Transport)
            .await?;

        let session = std::mem::take(&mut self.session);
        match verify_key_material(&self.keys, &material, &self.agreement.public_key(), session) {
            Ok((session, verified)) => {
                self.session = session;
                self.verified = Some(verified);
                self.state = HandshakeState::PeerVerified { session_id };
                debug!(session_id = %session_id, "key material verified");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "key material rejected");
                Err(self.fail(e))
            }
        }
    }

    /// `PeerVerified -> KeyEstablished`.
    pub fn establish_key(&mut self) -> Result<(), HandshakeError> {
        let session_id = match &self.state {
            HandshakeState::PeerVerified { session_id } => *session_id,
            other => {
                return Err(HandshakeError::InvalidState(format!(
                    "establish_key called in {}",
                    other.name()
                )))
            }
        };
        let Some(verified) = self.verified.as_ref() else {
            return Err(self.fail(HandshakeError::InvalidState("no verified key material".into())));
        };

        let session = std::mem::take(&mut self.session);
        match establish_key(&self.agreement, verified, self.config.suite, session) {
            Ok(session) => {
                self.session = session;
                self.state = HandshakeState::KeyEstablished { session_id };
                info!(session_id = %session_id, "shared key established");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run every step from `Init` to `KeyEstablished`.
    pub async fn run(&mut self) -> Result<(), HandshakeError> {
        self.verify_identity().await?;
        self.register().await?;
        self.verify_peer().await?;
        self.establish_key()
    }

    /// Hand the established key to a secure channel.
    pub fn into_session(mut self) -> Result<EstablishedSession<T>, HandshakeError> {
        let session_id = match &self.state {
            HandshakeState::KeyEstablished { session_id } => *session_id,
            other => {
                return Err(HandshakeError::InvalidState(format!(
                    "into_session called in {}",
                    other.name()
                )))
            }
        };
        let (Some(key), Some(peer)) = (
            self.session.shared_symmetric_key.clone(),
            self.session.peer_signing_public_key.clone(),
        ) else {
            return Err(HandshakeError::InvalidState("session is not established".into()));
        };

        let greeting = self.verified.take().and_then(|v| v.greeting);
        Ok(EstablishedSession {
            transport: self.transport,
            session_id,
            channel: SecureChannel::new(key, self.signing, peer),
            session: self.session,
            greeting,
            timeout: self.config.round_trip_timeout,
        })
    }

    /// Return to `Init` with fresh keypairs and an empty session.
    pub fn restart(&mut self) -> Result<(), HandshakeError> {
        let (signing, agreement) = generate_keypairs(&self.keys)?;
        self.session.teardown();
        self.signing = Arc::new(signing);
        self.agreement = agreement;
        self.verified = None;
        self.identity_verified = false;
        self.state = HandshakeState::Init;
        debug!("handshake restarted with fresh keys");
        Ok(())
    }

    fn expect_init(&self) -> Result<(), HandshakeError> {
        match &self.state {
            HandshakeState::Init => Ok(()),
            other => Err(HandshakeError::InvalidState(format!(
                "expected INIT, handshake is {}",
                other.name()
            ))),
        }
    }

    fn fail(&mut self, reason: HandshakeError) -> HandshakeError {
        self.session.teardown();
        self.verified = None;
        self.state = HandshakeState::Failed {
            reason: reason.clone(),
        };
        reason
    }

    /// Await one round trip under the configured timeout.
    ///
    /// The state reads `Failed(Cancelled)` while the round trip is pending,
    /// so dropping the future part way leaves the handshake failed.
    async fn round_trip<R, F, E>(&mut self, fut: F, on_error: E) -> Result<R, HandshakeError>
    where
        F: Future<Output = Result<R, TransportError>>,
        E: FnOnce(String) -> HandshakeError,
    {
        let prior = std::mem::replace(
            &mut self.state,
            HandshakeState::Failed {
                reason: HandshakeError::Cancelled("round trip interrupted".into()),
            },
        );
        match tokio::time::timeout(self.config.round_trip_timeout, fut).await {
            Ok(Ok(value)) => {
                self.state = prior;
                Ok(value)
            }
            Ok(Err(e)) => Err(self.fail(on_error(e.to_string()))),
            Err(_) => {
                warn!(state = prior.name(), "round trip timed out");
                Err(self.fail(HandshakeError::Cancelled(format!(
                    "no response within {:?}",
                    self.config.round_trip_timeout
                ))))
            }
        }
    }
}

impl<T: HandshakeTransport> std::fmt::Debug for ClientHandshake<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("state", &self.state)
            .field("suite", &self.config.suite)
            .finish_non_exhaustive()
    }
}

fn generate_keypairs(keys: &KeyManager) -> Result<(SigningKeypair, AgreementKeypair), HandshakeError> {
    let signing = keys
        .generate_signing_keypair()
        .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?;
    let agreement = keys
        .generate_agreement_keypair()
        .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?;
    Ok((signing, agreement))
}

/// Run the whole handshake and open a session.
pub async fn connect<T: HandshakeTransport>(
    transport: Arc<T>,
    config: HandshakeConfig,
) -> Result<EstablishedSession<T>, HandshakeError> {
    let mut handshake = ClientHandshake::new(transport, config)?;
    handshake.run().await?;
    handshake.into_session()
}

// ============================================================================
// Established session
// ============================================================================

/// A decrypted inbound message with the envelope it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub envelope: EncryptedEnvelope,
    pub plaintext: String,
}

/// Client session after `KeyEstablished`.
pub struct EstablishedSession<T: HandshakeTransport> {
    transport: Arc<T>,
    session_id: Uuid,
    channel: SecureChannel,
    session: SessionState,
    greeting: Option<EncryptedEnvelope>,
    timeout: Duration,
}

impl<T: HandshakeTransport> EstablishedSession<T> {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn shared_key(&self) -> &SymmetricKey {
        self.channel.key()
    }

    /// Open the greeting that came with the key material, once.
    pub fn take_greeting(&mut self) -> Result<Option<Received>, MessageError> {
        match self.greeting.take() {
            Some(envelope) => self.accept(envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Encrypt, sign and submit one message.
    pub async fn send(&mut self, plaintext: &str) -> Result<EncryptedEnvelope, MessageError> {
        let envelope = self.channel.seal(plaintext.as_bytes())?;
        let message = EnvelopeMessage::from_envelope(&envelope);
        let session_id = self.session_id;
        self.bounded(self.transport.submit_message(session_id, &message))
            .await?;
        debug!(session_id = %session_id, len = plaintext.len(), "message sent");
        Ok(envelope)
    }

    /// Fetch and open the server's latest message.
    pub async fn receive(&mut self) -> Result<Option<Received>, MessageError> {
        let session_id = self.session_id;
        let Some(message) = self.bounded(self.transport.fetch_message(session_id)).await? else {
            return Ok(None);
        };
        let envelope = message.to_envelope()?;
        self.accept(envelope).map(Some)
    }

    /// Close the session on the server and clear local secrets.
    pub async fn close(mut self) -> Result<(), MessageError> {
        let result = self.bounded(self.transport.close(self.session_id)).await;
        self.session.teardown();
        result
    }

    fn accept(&mut self, envelope: EncryptedEnvelope) -> Result<Received, MessageError> {
        let bytes = self.channel.open(&envelope)?;
        let plaintext = codec::utf8_decode(&bytes)?;
        self.session.last_received_nonce = Some(envelope.nonce.to_vec());
        Ok(Received {
            envelope,
            plaintext,
        })
    }

    async fn bounded<R, F>(&self, fut: F) -> Result<R, MessageError>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(match e.peer_kind() {
                Some(ErrorKind::Authentication) => MessageError::Authentication,
                Some(ErrorKind::Decryption) => MessageError::Decryption,
                Some(ErrorKind::Replay) => MessageError::Replay,
                _ => MessageError::Transport(e.to_string()),
            }),
            Err(_) => Err(MessageError::Transport(format!(
                "no response within {:?}",
                self.timeout
            ))),
        }
    }
}

impl<T: HandshakeTransport> std::fmt::Debug for EstablishedSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedSession")
            .field("session_id", &self.session_id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
