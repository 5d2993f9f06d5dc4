//! Server side of the handshake.
//!
//! The responder holds one long-lived signing identity and a registry of
//! independent sessions. Each session gets its own agreement keypair and
//! symmetric key; nothing but the identity key is shared between sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sealink_crypto::codec::{self, utf8_decode};
use sealink_crypto::keys::DEFAULT_RSA_BITS;
use sealink_crypto::nonce::{random_nonce, FRESHNESS_NONCE_LEN, WRAP_NONCE_LEN};
use sealink_crypto::utils::fingerprint;
use sealink_crypto::wrap::WrapError;
use sealink_crypto::{
    AgreementKeypair, AgreementPublicKey, CipherSuite, KeyManager, SecureChannel, SigningKeypair,
    SigningPublicKey, SymmetricKey,
};

use crate::errors::ResponderError;
use crate::messages::{EnvelopeMessage, KeyMaterial, MessageAck, RegisterAck, RegisterRequest, ServerIdentity};
use crate::session::SessionState;
use crate::transcript::{identity_payload, key_material_transcript, registration_payload};

/// Initial stored message, sent as the greeting until a client replaces it.
pub const DEFAULT_GREETING: &str = "This is a secret message";
/// Idle time after which a session is dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// Live sessions a responder holds before refusing registrations.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Responder settings.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub suite: CipherSuite,
    pub rsa_bits: usize,
    /// Message each new session starts with. `None` disables the greeting.
    pub greeting: Option<String>,
    /// Sessions idle for longer than this are swept.
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            suite: CipherSuite::default(),
            rsa_bits: DEFAULT_RSA_BITS,
            greeting: Some(DEFAULT_GREETING.to_string()),
            session_ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// One registered client.
pub struct ServerSession {
    id: Uuid,
    client_sign_key: Vec<u8>,
    client_box_key: Vec<u8>,
    agreement: AgreementKeypair,
    state: SessionState,
    channel: Option<SecureChannel>,
    stored_message: Option<String>,
    created_at: Instant,
    last_used: Instant,
}

impl ServerSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stored_message(&self) -> Option<&str> {
        self.stored_message.as_deref()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    fn is_idle(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used) >= ttl
    }

    fn teardown(&mut self) {
        self.channel = None;
        self.stored_message = None;
        self.state.teardown();
    }

    fn client_signing_key(&self) -> Result<&SigningPublicKey, ResponderError> {
        self.state
            .peer_signing_public_key
            .as_ref()
            .ok_or_else(|| ResponderError::InvalidState("session has been closed".into()))
    }

    fn client_agreement_key(&self) -> Result<&AgreementPublicKey, ResponderError> {
        self.state
            .peer_encryption_public_key
            .as_ref()
            .ok_or_else(|| ResponderError::InvalidState("session has been closed".into()))
    }

    fn channel_mut(&mut self) -> Result<&mut SecureChannel, ResponderError> {
        self.channel
            .as_mut()
            .ok_or_else(|| ResponderError::InvalidState("key material has not been issued".into()))
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, Arc<Mutex<ServerSession>>>,
    by_signer: HashMap<Vec<u8>, Uuid>,
}

/// Sessions indexed by id and by client signing key.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session`, returning any earlier session of the same client.
    ///
    /// A new client is refused once `max` sessions are live; replacing a
    /// client's own session is always allowed.
    pub async fn insert(
        &self,
        session: ServerSession,
        max: usize,
    ) -> Result<Option<Arc<Mutex<ServerSession>>>, ResponderError> {
        let id = session.id;
        let signer = session.client_sign_key.clone();
        let mut inner = self.inner.write().await;
        if !inner.by_signer.contains_key(&signer) && inner.sessions.len() >= max {
            return Err(ResponderError::SessionLimit(max));
        }
        let replaced = match inner.by_signer.insert(signer, id) {
            Some(old) => inner.sessions.remove(&old),
            None => None,
        };
        inner.sessions.insert(id, Arc::new(Mutex::new(session)));
        Ok(replaced)
    }

    /// Whether a session for `signer` could be inserted under `max`.
    pub async fn has_room_for(&self, signer: &[u8], max: usize) -> bool {
        let inner = self.inner.read().await;
        inner.by_signer.contains_key(signer) || inner.sessions.len() < max
    }

    /// Remove sessions idle for at least `ttl`. Sessions locked by an
    /// in-flight request are in use and stay.
    pub async fn remove_idle(&self, ttl: Duration, now: Instant) -> Vec<Arc<Mutex<ServerSession>>> {
        let mut inner = self.inner.write().await;
        let expired: Vec<Uuid> = inner
            .sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|session| session.is_idle(ttl, now))
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        let removed: Vec<_> = expired
            .iter()
            .filter_map(|id| inner.sessions.remove(id))
            .collect();
        inner.by_signer.retain(|_, id| !expired.contains(id));
        removed
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<ServerSession>>> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<Mutex<ServerSession>>> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(id)?;
        inner.by_signer.retain(|_, v| v != id);
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Handles identity proofs, registrations, key material and messages.
pub struct Responder {
    keys: KeyManager,
    identity: Arc<SigningKeypair>,
    greeting: Option<String>,
    session_ttl: Duration,
    max_sessions: usize,
    sessions: SessionRegistry,
}

impl Responder {
    /// Create a responder with a freshly generated signing identity.
    pub fn new(config: ResponderConfig) -> Result<Self, ResponderError> {
        let keys = KeyManager::with_rsa_bits(config.suite, config.rsa_bits)
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        let identity = keys
            .generate_signing_keypair()
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        Self::with_identity(config, identity)
    }

    /// Create a responder around an existing signing identity.
    pub fn with_identity(config: ResponderConfig, identity: SigningKeypair) -> Result<Self, ResponderError> {
        if identity.scheme() != config.suite.signature {
            return Err(ResponderError::Internal(format!(
                "identity key is {:?}, suite requires {:?}",
                identity.scheme(),
                config.suite.signature
            )));
        }
        let keys = KeyManager::with_rsa_bits(config.suite, config.rsa_bits)
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        info!(
            suite = %config.suite,
            identity = %fingerprint(&identity.export_public()),
            "responder ready"
        );
        Ok(Self {
            keys,
            identity: Arc::new(identity),
            greeting: config.greeting.filter(|g| !g.is_empty()),
            session_ttl: config.session_ttl,
            max_sessions: config.max_sessions,
            sessions: SessionRegistry::new(),
        })
    }

    pub fn suite(&self) -> CipherSuite {
        self.keys.suite()
    }

    pub fn identity_public_key(&self) -> SigningPublicKey {
        self.identity.public_key()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Sign a fresh 32-byte nonce with the identity key.
    pub fn identity_proof(&self) -> Result<ServerIdentity, ResponderError> {
        let nonce = random_nonce::<FRESHNESS_NONCE_LEN>()
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        let signature = self
            .identity
            .sign(identity_payload(&nonce).as_bytes())
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        Ok(ServerIdentity {
            sign_public_key: codec::encode(&self.identity.export_public()),
            nonce: codec::encode(&nonce),
            signature: codec::encode(&signature),
        })
    }

    /// Register a client and open a session for it.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterAck, ResponderError> {
        self.keys
            .suite()
            .ensure_matches(&request.suite)
            .map_err(|e| ResponderError::SuiteMismatch(e.to_string()))?;

        let sign_bytes = codec::decode("signPublicKey", &request.sign_public_key)?;
        let box_bytes = codec::decode("boxPublicKey", &request.box_public_key)?;
        let signature = codec::decode("signature", &request.signature)?;

        let client_signing = self
            .keys
            .parse_signing_public(&sign_bytes)
            .map_err(|e| ResponderError::Malformed(e.to_string()))?;
        let client_agreement = self
            .keys
            .parse_agreement_public(&box_bytes)
            .map_err(|e| ResponderError::Malformed(e.to_string()))?;

        if client_signing
            .verify(registration_payload(&box_bytes).as_bytes(), &signature)
            .is_err()
        {
            warn!(client = %fingerprint(&sign_bytes), "registration signature rejected");
            return Err(ResponderError::SignatureVerification);
        }

        self.cleanup_expired().await;
        if !self.sessions.has_room_for(&sign_bytes, self.max_sessions).await {
            warn!(max_sessions = self.max_sessions, "session limit reached, registration refused");
            return Err(ResponderError::SessionLimit(self.max_sessions));
        }

        let keys = self.keys.clone();
        let agreement = tokio::task::spawn_blocking(move || keys.generate_agreement_keypair())
            .await
            .map_err(|e| ResponderError::Internal(e.to_string()))?
            .map_err(|e| ResponderError::Internal(e.to_string()))?;

        let id = Uuid::new_v4();
        let mut state = SessionState::new();
        state.peer_signing_public_key = Some(client_signing);
        state.peer_encryption_public_key = Some(client_agreement);

        let session = ServerSession {
            id,
            client_sign_key: sign_bytes,
            client_box_key: box_bytes,
            agreement,
            state,
            channel: None,
            stored_message: self.greeting.clone(),
            created_at: Instant::now(),
            last_used: Instant::now(),
        };
        let client = fingerprint(&session.client_sign_key);

        if let Some(old) = self.sessions.insert(session, self.max_sessions).await? {
            let mut old = old.lock().await;
            debug!(session_id = %old.id, "replacing earlier session of the same client");
            old.teardown();
        }

        info!(session_id = %id, client = %client, "client registered");
        Ok(RegisterAck { session_id: id })
    }

    /// Generate, wrap and sign a fresh symmetric key for `session_id`.
    ///
    /// Calling this again re-keys the session.
    pub async fn issue_key_material(&self, session_id: Uuid) -> Result<KeyMaterial, ResponderError> {
        let handle = self
            .sessions
            .get(&session_id)
            .await
            .ok_or(ResponderError::UnknownSession)?;
        let mut session = handle.lock().await;
        session.touch();

        let client_signing = session.client_signing_key()?.clone();
        let client_agreement = session.client_agreement_key()?.clone();

        let key = SymmetricKey::generate(self.keys.suite().aead)
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        let wrap_nonce = random_nonce::<WRAP_NONCE_LEN>()
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        let wrapped = session
            .agreement
            .wrap_key(&client_agreement, &key, &wrap_nonce)
            .map_err(|e| match e {
                WrapError::NonContributory => {
                    ResponderError::Malformed("client box public key is not contributory".into())
                }
                other => ResponderError::Internal(other.to_string()),
            })?;

        let mut channel = SecureChannel::new(key.clone(), Arc::clone(&self.identity), client_signing);
        let greeting = match session.stored_message.as_deref() {
            Some(text) => Some(channel.seal(text.as_bytes())?),
            None => None,
        };

        let server_box = session.agreement.export_public();
        let transcript = key_material_transcript(
            &wrap_nonce,
            &wrapped,
            &server_box,
            &session.client_box_key,
            greeting.as_ref(),
        );
        let signature = self
            .identity
            .sign(transcript.as_bytes())
            .map_err(|e| ResponderError::Internal(e.to_string()))?;

        session.state.shared_symmetric_key = Some(key);
        session.state.peer_verified = true;
        session.channel = Some(channel);

        debug!(session_id = %session_id, greeting = greeting.is_some(), "issued key material");
        Ok(KeyMaterial {
            server_sign_public_key: codec::encode(&self.identity.export_public()),
            server_box_public_key: codec::encode(&server_box),
            wrap_nonce: codec::encode(&wrap_nonce),
            wrapped_key: codec::encode(&wrapped),
            greeting: greeting.as_ref().map(EnvelopeMessage::from_envelope),
            signature: codec::encode(&signature),
        })
    }

    /// Verify and decrypt a client message and store its plaintext.
    pub async fn receive_message(
        &self,
        session_id: Uuid,
        message: &EnvelopeMessage,
    ) -> Result<MessageAck, ResponderError> {
        let handle = self
            .sessions
            .get(&session_id)
            .await
            .ok_or(ResponderError::UnknownSession)?;
        let mut session = handle.lock().await;
        session.touch();

        let envelope = message.to_envelope()?;
        let plaintext = session.channel_mut()?.open(&envelope).map_err(|e| {
            warn!(session_id = %session_id, error = %e, "rejected client message");
            ResponderError::from(e)
        })?;
        let text = utf8_decode(&plaintext)?;

        info!(session_id = %session_id, len = text.len(), "received client message");
        session.state.last_received_nonce = Some(envelope.nonce.to_vec());
        session.stored_message = Some(text);
        Ok(MessageAck {
            nonce: message.nonce.clone(),
        })
    }

    /// Seal the session's stored message for the client.
    pub async fn latest_message(&self, session_id: Uuid) -> Result<Option<EnvelopeMessage>, ResponderError> {
        let handle = self
            .sessions
            .get(&session_id)
            .await
            .ok_or(ResponderError::UnknownSession)?;
        let mut session = handle.lock().await;
        session.touch();

        let Some(text) = session.stored_message.clone() else {
            session.channel_mut()?;
            return Ok(None);
        };
        let envelope = session.channel_mut()?.seal(text.as_bytes())?;
        Ok(Some(EnvelopeMessage::from_envelope(&envelope)))
    }

    /// Tear a session down.
    pub async fn close(&self, session_id: Uuid) -> Result<(), ResponderError> {
        let handle = self
            .sessions
            .remove(&session_id)
            .await
            .ok_or(ResponderError::UnknownSession)?;
        handle.lock().await.teardown();
        info!(session_id = %session_id, "session closed");
        Ok(())
    }

    /// Drop every session idle for longer than the configured TTL.
    ///
    /// Returns the number of sessions removed.
    pub async fn cleanup_expired(&self) -> usize {
        let removed = self
            .sessions
            .remove_idle(self.session_ttl, Instant::now())
            .await;
        for handle in &removed {
            let mut session = handle.lock().await;
            debug!(session_id = %session.id, "expiring idle session");
            session.teardown();
        }
        if !removed.is_empty() {
            info!(expired = removed.len(), "swept idle sessions");
        }
        removed.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Handle to a live session, for inspection.
    pub async fn session(&self, session_id: Uuid) -> Option<Arc<Mutex<ServerSession>>> {
        self.sessions.get(&session_id).await
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("suite", &self.keys.suite())
            .finish_non_exhaustive()
    }
}
