//! Public-key wrapping of the shared symmetric key.
//!
//! X25519 box: static-static X25519 between the wrapper's agreement secret and
//! the recipient's agreement public key, HKDF-SHA256 keyed by the wrap nonce,
//! ChaCha20-Poly1305 over the 32 key bytes with AAD `wrapper_pub || recipient_pub`.
//!
//! RSA-OAEP: OAEP-SHA256 under the recipient's public key, with the base64
//! wrap nonce as the OAEP label.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::Zeroize;

use crate::codec;
use crate::keys::{AgreementKeypair, AgreementPublicKey, X25519Box};
use crate::nonce::WRAP_NONCE_LEN;
use crate::suite::AeadAlgorithm;
use crate::symmetric::{SymmetricKey, SYMMETRIC_KEY_LEN};

const WRAP_KEY_INFO: &[u8] = b"sealink_wrap_v1_key";
const WRAP_NONCE_INFO: &[u8] = b"sealink_wrap_v1_nonce";

/// Error type for key wrapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WrapError {
    #[error("peer key does not match the wrap scheme")]
    SchemeMismatch,
    #[error("peer key is not contributory")]
    NonContributory,
    #[error("key wrapping failed")]
    WrapFailed,
    #[error("key unwrap failed")]
    UnwrapFailed,
    #[error("unwrapped key has invalid length {0}")]
    InvalidKeyLength(usize),
}

impl AgreementKeypair {
    /// Wrap `key` for `recipient`.
    pub fn wrap_key(
        &self,
        recipient: &AgreementPublicKey,
        key: &SymmetricKey,
        wrap_nonce: &[u8; WRAP_NONCE_LEN],
    ) -> Result<Vec<u8>, WrapError> {
        match (self, recipient) {
            (AgreementKeypair::X25519(own), AgreementPublicKey::X25519(peer)) => {
                let (cipher, nonce) = box_cipher(own, peer, wrap_nonce)?;
                let aad = box_aad(&own.public, peer);
                cipher
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: key.as_bytes(),
                            aad: &aad,
                        },
                    )
                    .map_err(|_| WrapError::WrapFailed)
            }
            (AgreementKeypair::RsaOaep(_), AgreementPublicKey::RsaOaep(peer)) => peer
                .key()
                .encrypt(&mut OsRng, oaep_padding(wrap_nonce), key.as_bytes())
                .map_err(|_| WrapError::WrapFailed),
            _ => Err(WrapError::SchemeMismatch),
        }
    }

    /// Recover the key that `sender` wrapped for us.
    pub fn unwrap_key(
        &self,
        sender: &AgreementPublicKey,
        wrap_nonce: &[u8; WRAP_NONCE_LEN],
        wrapped: &[u8],
        aead: AeadAlgorithm,
    ) -> Result<SymmetricKey, WrapError> {
        let mut raw = match (self, sender) {
            (AgreementKeypair::X25519(own), AgreementPublicKey::X25519(peer)) => {
                let (cipher, nonce) = box_cipher(own, peer, wrap_nonce)?;
                let aad = box_aad(peer, &own.public);
                cipher
                    .decrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: wrapped,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| WrapError::UnwrapFailed)?
            }
            (AgreementKeypair::RsaOaep(own), AgreementPublicKey::RsaOaep(_)) => own
                .key
                .decrypt(oaep_padding(wrap_nonce), wrapped)
                .map_err(|_| WrapError::UnwrapFailed)?,
            _ => return Err(WrapError::SchemeMismatch),
        };

        let got = raw.len();
        let bytes: Result<[u8; SYMMETRIC_KEY_LEN], _> = raw.as_slice().try_into();
        raw.zeroize();
        let bytes = bytes.map_err(|_| WrapError::InvalidKeyLength(got))?;
        Ok(SymmetricKey::from_bytes(bytes, aead))
    }
}

fn box_cipher(
    own: &X25519Box,
    peer: &X25519PublicKey,
    wrap_nonce: &[u8; WRAP_NONCE_LEN],
) -> Result<(ChaCha20Poly1305, [u8; 12]), WrapError> {
    let shared = own.secret.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(WrapError::NonContributory);
    }

    let hk = Hkdf::<Sha256>::new(Some(wrap_nonce), shared.as_bytes());
    let mut key = [0u8; 32];
    let mut nonce = [0u8; 12];
    hk.expand(WRAP_KEY_INFO, &mut key)
        .map_err(|_| WrapError::WrapFailed)?;
    hk.expand(WRAP_NONCE_INFO, &mut nonce)
        .map_err(|_| WrapError::WrapFailed)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    key.zeroize();
    Ok((cipher, nonce))
}

fn box_aad(wrapper: &X25519PublicKey, recipient: &X25519PublicKey) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(wrapper.as_bytes());
    aad[32..].copy_from_slice(recipient.as_bytes());
    aad
}

fn oaep_padding(wrap_nonce: &[u8; WRAP_NONCE_LEN]) -> Oaep {
    Oaep::new_with_label::<Sha256, _>(codec::encode(wrap_nonce))
}
