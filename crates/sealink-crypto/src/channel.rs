//! Signed, encrypted application envelopes.
//!
//! An envelope is `{ciphertext, nonce, signature}` where the signature covers
//! `b64(nonce) || b64(ciphertext)`. The receiver verifies the signature before
//! it touches the ciphertext, so a forged or tampered envelope never reaches
//! the AEAD.

use std::sync::Arc;

use tracing::debug;

use crate::codec::SignedText;
use crate::keys::{SigningKeypair, SigningPublicKey};
use crate::nonce::{NonceError, NonceRegistry, AEAD_NONCE_LEN, MAX_MESSAGES_PER_KEY};
use crate::symmetric::{SymmetricError, SymmetricKey};

/// Error type for channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("envelope signature did not verify")]
    Authentication,
    #[error("envelope decryption failed")]
    Decryption,
    #[error("envelope nonce was already accepted")]
    Replay,
    #[error("channel key has reached its message limit")]
    Exhausted,
    #[error("encryption failed")]
    Encryption,
    #[error("signing failed")]
    Signing,
    #[error("randomness source unavailable")]
    Rng,
}

/// One encrypted application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; AEAD_NONCE_LEN],
    pub signature: Vec<u8>,
}

impl EncryptedEnvelope {
    /// The text this envelope's signature covers.
    pub fn signed_payload(&self) -> SignedText {
        signed_payload(&self.nonce, &self.ciphertext)
    }
}

/// `b64(nonce) || b64(ciphertext)`
pub fn signed_payload(nonce: &[u8; AEAD_NONCE_LEN], ciphertext: &[u8]) -> SignedText {
    let mut text = SignedText::new();
    text.append_bytes(nonce).append_bytes(ciphertext);
    text
}

/// Encrypt `plaintext` under a fresh random nonce and sign the result.
pub fn encrypt(
    plaintext: &[u8],
    key: &SymmetricKey,
    signer: &SigningKeypair,
) -> Result<EncryptedEnvelope, ChannelError> {
    let (nonce, ciphertext) = key.seal_random(plaintext).map_err(map_seal_error)?;
    sign_envelope(nonce, ciphertext, signer)
}

/// Encrypt under a caller-chosen nonce. The caller owns uniqueness.
pub fn encrypt_with_nonce(
    nonce: [u8; AEAD_NONCE_LEN],
    plaintext: &[u8],
    key: &SymmetricKey,
    signer: &SigningKeypair,
) -> Result<EncryptedEnvelope, ChannelError> {
    let ciphertext = key.seal(&nonce, plaintext).map_err(map_seal_error)?;
    sign_envelope(nonce, ciphertext, signer)
}

/// Verify the envelope signature against `peer`, then decrypt.
pub fn decrypt(
    envelope: &EncryptedEnvelope,
    key: &SymmetricKey,
    peer: &SigningPublicKey,
) -> Result<Vec<u8>, ChannelError> {
    verify(envelope, peer)?;
    key.open(&envelope.nonce, &envelope.ciphertext)
        .map_err(|_| ChannelError::Decryption)
}

/// Verify only the envelope signature.
pub fn verify(envelope: &EncryptedEnvelope, peer: &SigningPublicKey) -> Result<(), ChannelError> {
    peer.verify(envelope.signed_payload().as_bytes(), &envelope.signature)
        .map_err(|_| ChannelError::Authentication)
}

fn sign_envelope(
    nonce: [u8; AEAD_NONCE_LEN],
    ciphertext: Vec<u8>,
    signer: &SigningKeypair,
) -> Result<EncryptedEnvelope, ChannelError> {
    let signature = signer
        .sign(signed_payload(&nonce, &ciphertext).as_bytes())
        .map_err(|_| ChannelError::Signing)?;
    Ok(EncryptedEnvelope {
        ciphertext,
        nonce,
        signature,
    })
}

fn map_seal_error(e: SymmetricError) -> ChannelError {
    match e {
        SymmetricError::RngUnavailable => ChannelError::Rng,
        _ => ChannelError::Encryption,
    }
}

/// An established channel between two parties.
///
/// Outbound nonces are drawn fresh and checked against a window of recent
/// ones. Every accepted inbound nonce is remembered, so a replay is always
/// refused; after [`MAX_MESSAGES_PER_KEY`] accepted envelopes the channel
/// refuses further input until the key is replaced.
pub struct SecureChannel {
    key: SymmetricKey,
    signer: Arc<SigningKeypair>,
    peer: SigningPublicKey,
    outbound: NonceRegistry,
    inbound: NonceRegistry,
}

impl SecureChannel {
    pub fn new(key: SymmetricKey, signer: Arc<SigningKeypair>, peer: SigningPublicKey) -> Self {
        Self::with_message_limit(key, signer, peer, MAX_MESSAGES_PER_KEY)
    }

    /// Channel accepting at most `limit` inbound envelopes.
    pub fn with_message_limit(
        key: SymmetricKey,
        signer: Arc<SigningKeypair>,
        peer: SigningPublicKey,
        limit: usize,
    ) -> Self {
        Self {
            key,
            signer,
            peer,
            outbound: NonceRegistry::new(),
            inbound: NonceRegistry::bounded(limit),
        }
    }

    /// Encrypt and sign one outbound message.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<EncryptedEnvelope, ChannelError> {
        let nonce = self.outbound.fresh().map_err(|_| ChannelError::Rng)?;
        encrypt_with_nonce(nonce, plaintext, &self.key, &self.signer)
    }

    /// Verify, replay-check and decrypt one inbound message.
    pub fn open(&mut self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, ChannelError> {
        verify(envelope, &self.peer)?;
        if self.inbound.contains(&envelope.nonce) {
            debug!(nonce = %hex::encode(&envelope.nonce[..4]), "rejecting replayed envelope");
            return Err(ChannelError::Replay);
        }
        if self.inbound.is_exhausted() {
            return Err(ChannelError::Exhausted);
        }
        let plaintext = self
            .key
            .open(&envelope.nonce, &envelope.ciphertext)
            .map_err(|_| ChannelError::Decryption)?;
        self.inbound
            .check_and_insert(&envelope.nonce)
            .map_err(|e| match e {
                NonceError::Exhausted => ChannelError::Exhausted,
                _ => ChannelError::Replay,
            })?;
        Ok(plaintext)
    }

    /// Nonce of the last envelope accepted by [`SecureChannel::open`].
    pub fn last_received_nonce(&self) -> Option<&[u8; AEAD_NONCE_LEN]> {
        self.inbound.last()
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn peer(&self) -> &SigningPublicKey {
        &self.peer
    }

    pub fn sent_count(&self) -> u64 {
        self.outbound.total()
    }

    pub fn received_count(&self) -> usize {
        self.inbound.len()
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("aead", &self.key.aead())
            .field("sent", &self.outbound.len())
            .field("received", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyManager;
    use crate::suite::{AeadAlgorithm, CipherSuite};

    fn parties() -> (Arc<SigningKeypair>, Arc<SigningKeypair>, SymmetricKey) {
        let mgr = KeyManager::new(CipherSuite::curve25519());
        let client = Arc::new(mgr.generate_signing_keypair().unwrap());
        let server = Arc::new(mgr.generate_signing_keypair().unwrap());
        let key = SymmetricKey::generate(AeadAlgorithm::Aes256Gcm).unwrap();
        (client, server, key)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let (client, _, key) = parties();
        let env = encrypt(b"Hello from client", &key, &client).unwrap();
        let pt = decrypt(&env, &key, &client.public_key()).unwrap();
        assert_eq!(pt, b"Hello from client");
    }

    #[test]
    fn test_tampered_ciphertext_is_authentication_error() {
        let (client, _, key) = parties();
        let mut env = encrypt(b"payload", &key, &client).unwrap();
        env.ciphertext[0] ^= 0x80;
        assert_eq!(
            decrypt(&env, &key, &client.public_key()),
            Err(ChannelError::Authentication)
        );
    }

    #[test]
    fn test_tampered_nonce_is_authentication_error() {
        let (client, _, key) = parties();
        let mut env = encrypt(b"payload", &key, &client).unwrap();
        env.nonce[11] ^= 0x01;
        assert_eq!(
            decrypt(&env, &key, &client.public_key()),
            Err(ChannelError::Authentication)
        );
    }

    #[test]
    fn test_wrong_signer_is_authentication_error() {
        let (client, server, key) = parties();
        let env = encrypt(b"payload", &key, &client).unwrap();
        assert_eq!(
            decrypt(&env, &key, &server.public_key()),
            Err(ChannelError::Authentication)
        );
    }

    #[test]
    fn test_wrong_key_is_decryption_error() {
        let (client, _, key) = parties();
        let other = SymmetricKey::generate(AeadAlgorithm::Aes256Gcm).unwrap();
        let env = encrypt(b"payload", &key, &client).unwrap();
        assert_eq!(
            decrypt(&env, &other, &client.public_key()),
            Err(ChannelError::Decryption)
        );
    }

    #[test]
    fn test_channel_pair_exchange() {
        let (client, server, key) = parties();
        let mut client_side = SecureChannel::new(key.clone(), client.clone(), server.public_key());
        let mut server_side = SecureChannel::new(key, server, client.public_key());

        let env = client_side.seal(b"ping").unwrap();
        assert_eq!(server_side.open(&env).unwrap(), b"ping");
        assert_eq!(server_side.last_received_nonce(), Some(&env.nonce));

        let reply = server_side.seal(b"pong").unwrap();
        assert_eq!(client_side.open(&reply).unwrap(), b"pong");
    }

    #[test]
    fn test_replay_rejected() {
        let (client, server, key) = parties();
        let mut client_side = SecureChannel::new(key.clone(), client.clone(), server.public_key());
        let mut server_side = SecureChannel::new(key, server, client.public_key());

        let env = client_side.seal(b"once").unwrap();
        server_side.open(&env).unwrap();
        assert_eq!(server_side.open(&env), Err(ChannelError::Replay));
    }

    #[test]
    fn test_failed_open_does_not_consume_nonce() {
        let (client, server, key) = parties();
        let mut client_side = SecureChannel::new(key.clone(), client.clone(), server.public_key());
        let mut server_side = SecureChannel::new(key, server, client.public_key());

        let env = client_side.seal(b"msg").unwrap();
        let mut bad = env.clone();
        bad.signature[0] ^= 0x01;
        assert_eq!(server_side.open(&bad), Err(ChannelError::Authentication));
        assert!(server_side.last_received_nonce().is_none());
        assert_eq!(server_side.open(&env).unwrap(), b"msg");
    }

    #[test]
    fn test_outbound_nonces_unique() {
        let (client, server, key) = parties();
        let mut ch = SecureChannel::new(key, client, server.public_key());
        let mut nonces = std::collections::HashSet::new();
        for _ in 0..256 {
            assert!(nonces.insert(ch.seal(b"x").unwrap().nonce));
        }
        assert_eq!(ch.sent_count(), 256);
    }

    #[test]
    fn test_outbound_window_is_bounded() {
        let (client, server, key) = parties();
        let mut ch = SecureChannel::new(key, client, server.public_key());
        for _ in 0..(crate::nonce::DEFAULT_NONCE_WINDOW + 100) {
            ch.seal(b"poll").unwrap();
        }
        assert_eq!(ch.sent_count(), (crate::nonce::DEFAULT_NONCE_WINDOW + 100) as u64);
        assert!(format!("{ch:?}").contains(&format!("sent: {}", crate::nonce::DEFAULT_NONCE_WINDOW)));
    }

    #[test]
    fn test_inbound_limit_refuses_without_forgetting() {
        let (client, server, key) = parties();
        let mut client_side = SecureChannel::new(key.clone(), client.clone(), server.public_key());
        let mut server_side = SecureChannel::with_message_limit(key, server, client.public_key(), 2);

        let first = client_side.seal(b"one").unwrap();
        server_side.open(&first).unwrap();
        server_side.open(&client_side.seal(b"two").unwrap()).unwrap();

        let third = client_side.seal(b"three").unwrap();
        assert_eq!(server_side.open(&third), Err(ChannelError::Exhausted));
        assert_eq!(server_side.open(&first), Err(ChannelError::Replay));
        assert_eq!(server_side.received_count(), 2);
    }
}
