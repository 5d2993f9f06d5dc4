//! The shared symmetric key and its AEAD.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as GcmNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaChaNonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::nonce::{random_nonce, AEAD_NONCE_LEN};
use crate::suite::AeadAlgorithm;
use crate::utils::constant_time_compare_array;

pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Error type for symmetric operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymmetricError {
    #[error("randomness source unavailable")]
    RngUnavailable,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
}

/// 256-bit key shared by both parties after the handshake.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; SYMMETRIC_KEY_LEN],
    #[zeroize(skip)]
    aead: AeadAlgorithm,
}

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate(aead: AeadAlgorithm) -> Result<Self, SymmetricError> {
        let bytes = random_nonce::<SYMMETRIC_KEY_LEN>().map_err(|_| SymmetricError::RngUnavailable)?;
        Ok(Self { bytes, aead })
    }

    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LEN], aead: AeadAlgorithm) -> Self {
        Self { bytes, aead }
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.bytes
    }

    pub fn aead(&self) -> AeadAlgorithm {
        self.aead
    }

    /// Constant-time key comparison.
    pub fn ct_eq(&self, other: &SymmetricKey) -> bool {
        self.aead == other.aead && constant_time_compare_array(&self.bytes, &other.bytes)
    }

    /// Encrypt under `nonce`. Output is ciphertext || tag.
    pub fn seal(&self, nonce: &[u8; AEAD_NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        match self.aead {
            AeadAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(&self.bytes)
                .map_err(|_| SymmetricError::EncryptionFailed)?
                .encrypt(GcmNonce::from_slice(nonce), plaintext),
            AeadAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.bytes)
                .map_err(|_| SymmetricError::EncryptionFailed)?
                .encrypt(ChaChaNonce::from_slice(nonce), plaintext),
        }
        .map_err(|_| SymmetricError::EncryptionFailed)
    }

    /// Decrypt and authenticate ciphertext || tag.
    pub fn open(&self, nonce: &[u8; AEAD_NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        match self.aead {
            AeadAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(&self.bytes)
                .map_err(|_| SymmetricError::DecryptionFailed)?
                .decrypt(GcmNonce::from_slice(nonce), ciphertext),
            AeadAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.bytes)
                .map_err(|_| SymmetricError::DecryptionFailed)?
                .decrypt(ChaChaNonce::from_slice(nonce), ciphertext),
        }
        .map_err(|_| SymmetricError::DecryptionFailed)
    }

    /// Encrypt under a fresh random nonce.
    pub fn seal_random(&self, plaintext: &[u8]) -> Result<([u8; AEAD_NONCE_LEN], Vec<u8>), SymmetricError> {
        let nonce = random_nonce::<AEAD_NONCE_LEN>().map_err(|_| SymmetricError::RngUnavailable)?;
        let ct = self.seal(&nonce, plaintext)?;
        Ok((nonce, ct))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("aead", &self.aead)
            .finish_non_exhaustive()
    }
}
