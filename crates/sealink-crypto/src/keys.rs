//! Keypair management for both protocol roles.
//!
//! Each party holds a signing keypair (identity proofs, transcripts, message
//! envelopes) and a key-agreement keypair (symmetric key wrapping). Which
//! algorithms back them is fixed by the [`CipherSuite`]. Private halves never
//! leave this module except through signing and unwrapping; the underlying
//! secret types zeroize themselves on drop.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::nonce::random_nonce;
use crate::suite::{CipherSuite, KeyWrapScheme, SignatureScheme};

/// Default RSA modulus size.
pub const DEFAULT_RSA_BITS: usize = 2048;
/// RSA modulus sizes accepted for key generation.
pub const SUPPORTED_RSA_BITS: [usize; 3] = [2048, 3072, 4096];

/// Error type for key operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),
    #[error("unsupported RSA modulus size: {0} bits")]
    UnsupportedModulus(usize),
    #[error("invalid {scheme} public key")]
    InvalidPublicKey { scheme: &'static str },
    #[error("signing failed")]
    Signing,
    #[error("signature verification failed")]
    BadSignature,
}

/// Role a keypair plays in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Signing,
    KeyAgreement,
}

/// RSA public key together with its SubjectPublicKeyInfo DER encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaPublic {
    key: RsaPublicKey,
    der: Vec<u8>,
}

impl RsaPublic {
    fn from_key(key: RsaPublicKey, scheme: &'static str) -> Result<Self, KeyError> {
        let der = key
            .to_public_key_der()
            .map_err(|_| KeyError::InvalidPublicKey { scheme })?
            .as_bytes()
            .to_vec();
        Ok(Self { key, der })
    }

    fn from_der(der: &[u8], scheme: &'static str) -> Result<Self, KeyError> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|_| KeyError::InvalidPublicKey { scheme })?;
        Ok(Self {
            key,
            der: der.to_vec(),
        })
    }

    pub fn key(&self) -> &RsaPublicKey {
        &self.key
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

// ============================================================================
// Signing role
// ============================================================================

/// Ed25519 signing keypair.
pub struct Ed25519Signer {
    key: SigningKey,
}

/// RSASSA-PSS (SHA-256) signing keypair.
pub struct RsaPssSigner {
    key: rsa::pss::SigningKey<Sha256>,
    public: RsaPublic,
}

/// A signing keypair under the configured signature scheme.
pub enum SigningKeypair {
    Ed25519(Ed25519Signer),
    RsaPss(RsaPssSigner),
}

impl SigningKeypair {
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            SigningKeypair::Ed25519(_) => SignatureScheme::Ed25519,
            SigningKeypair::RsaPss(_) => SignatureScheme::RsaPss,
        }
    }

    pub fn role(&self) -> KeyRole {
        KeyRole::Signing
    }

    pub fn public_key(&self) -> SigningPublicKey {
        match self {
            SigningKeypair::Ed25519(s) => SigningPublicKey::Ed25519(s.key.verifying_key()),
            SigningKeypair::RsaPss(s) => SigningPublicKey::RsaPss(s.public.clone()),
        }
    }

    /// Sign `message` with the private half.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            SigningKeypair::Ed25519(s) => {
                let sig: Signature = s.key.sign(message);
                Ok(sig.to_bytes().to_vec())
            }
            SigningKeypair::RsaPss(s) => {
                let sig = s
                    .key
                    .try_sign_with_rng(&mut OsRng, message)
                    .map_err(|_| KeyError::Signing)?;
                Ok(sig.to_vec())
            }
        }
    }

    /// Public half in wire format.
    pub fn export_public(&self) -> Vec<u8> {
        self.public_key().to_bytes()
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("scheme", &self.scheme())
            .finish_non_exhaustive()
    }
}

/// Public half of a signing keypair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningPublicKey {
    Ed25519(VerifyingKey),
    RsaPss(RsaPublic),
}

impl SigningPublicKey {
    /// Parse wire bytes under `scheme`.
    pub fn from_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self, KeyError> {
        match scheme {
            SignatureScheme::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| KeyError::InvalidPublicKey { scheme: "ed25519" })?;
                let vk = VerifyingKey::from_bytes(&arr)
                    .map_err(|_| KeyError::InvalidPublicKey { scheme: "ed25519" })?;
                Ok(SigningPublicKey::Ed25519(vk))
            }
            SignatureScheme::RsaPss => Ok(SigningPublicKey::RsaPss(RsaPublic::from_der(
                bytes,
                "rsa-pss",
            )?)),
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            SigningPublicKey::Ed25519(_) => SignatureScheme::Ed25519,
            SigningPublicKey::RsaPss(_) => SignatureScheme::RsaPss,
        }
    }

    /// Wire format: raw 32 bytes for Ed25519, SPKI DER for RSA.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SigningPublicKey::Ed25519(vk) => vk.to_bytes().to_vec(),
            SigningPublicKey::RsaPss(pk) => pk.der.clone(),
        }
    }

    /// Verify `signature` over exactly `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match self {
            SigningPublicKey::Ed25519(vk) => {
                let sig_bytes: [u8; 64] =
                    signature.try_into().map_err(|_| KeyError::BadSignature)?;
                let sig = Signature::from_bytes(&sig_bytes);
                vk.verify_strict(message, &sig)
                    .map_err(|_| KeyError::BadSignature)
            }
            SigningPublicKey::RsaPss(pk) => {
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| KeyError::BadSignature)?;
                rsa::pss::VerifyingKey::<Sha256>::new(pk.key.clone())
                    .verify(message, &sig)
                    .map_err(|_| KeyError::BadSignature)
            }
        }
    }
}

// ============================================================================
// Key-agreement role
// ============================================================================

/// X25519 keypair used for sealed-box key wrapping.
pub struct X25519Box {
    pub(crate) secret: StaticSecret,
    pub(crate) public: X25519PublicKey,
}

/// RSA keypair used for OAEP key wrapping.
pub struct RsaOaepWrap {
    pub(crate) key: RsaPrivateKey,
    pub(crate) public: RsaPublic,
}

/// A key-agreement keypair under the configured wrap scheme.
pub enum AgreementKeypair {
    X25519(X25519Box),
    RsaOaep(RsaOaepWrap),
}

impl AgreementKeypair {
    pub fn scheme(&self) -> KeyWrapScheme {
        match self {
            AgreementKeypair::X25519(_) => KeyWrapScheme::X25519Box,
            AgreementKeypair::RsaOaep(_) => KeyWrapScheme::RsaOaep,
        }
    }

    pub fn role(&self) -> KeyRole {
        KeyRole::KeyAgreement
    }

    pub fn public_key(&self) -> AgreementPublicKey {
        match self {
            AgreementKeypair::X25519(b) => AgreementPublicKey::X25519(b.public),
            AgreementKeypair::RsaOaep(w) => AgreementPublicKey::RsaOaep(w.public.clone()),
        }
    }

    pub fn export_public(&self) -> Vec<u8> {
        self.public_key().to_bytes()
    }
}

impl fmt::Debug for AgreementKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeypair")
            .field("scheme", &self.scheme())
            .finish_non_exhaustive()
    }
}

/// Public half of a key-agreement keypair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgreementPublicKey {
    X25519(X25519PublicKey),
    RsaOaep(RsaPublic),
}

impl AgreementPublicKey {
    pub fn from_bytes(scheme: KeyWrapScheme, bytes: &[u8]) -> Result<Self, KeyError> {
        match scheme {
            KeyWrapScheme::X25519Box => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| KeyError::InvalidPublicKey { scheme: "x25519" })?;
                Ok(AgreementPublicKey::X25519(X25519PublicKey::from(arr)))
            }
            KeyWrapScheme::RsaOaep => Ok(AgreementPublicKey::RsaOaep(RsaPublic::from_der(
                bytes,
                "rsa-oaep",
            )?)),
        }
    }

    pub fn scheme(&self) -> KeyWrapScheme {
        match self {
            AgreementPublicKey::X25519(_) => KeyWrapScheme::X25519Box,
            AgreementPublicKey::RsaOaep(_) => KeyWrapScheme::RsaOaep,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            AgreementPublicKey::X25519(pk) => pk.as_bytes().to_vec(),
            AgreementPublicKey::RsaOaep(pk) => pk.der.clone(),
        }
    }
}

// ============================================================================
// Key manager
// ============================================================================

/// Generates keypairs for one party under a fixed suite.
#[derive(Debug, Clone)]
pub struct KeyManager {
    suite: CipherSuite,
    rsa_bits: usize,
}

impl KeyManager {
    pub fn new(suite: CipherSuite) -> Self {
        Self {
            suite,
            rsa_bits: DEFAULT_RSA_BITS,
        }
    }

    /// Use a non-default RSA modulus size.
    pub fn with_rsa_bits(suite: CipherSuite, rsa_bits: usize) -> Result<Self, KeyError> {
        if !SUPPORTED_RSA_BITS.contains(&rsa_bits) {
            return Err(KeyError::UnsupportedModulus(rsa_bits));
        }
        Ok(Self { suite, rsa_bits })
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn rsa_bits(&self) -> usize {
        self.rsa_bits
    }

    /// Generate a signing keypair for the configured signature scheme.
    pub fn generate_signing_keypair(&self) -> Result<SigningKeypair, KeyError> {
        match self.suite.signature {
            SignatureScheme::Ed25519 => {
                let mut seed = random_nonce::<32>()
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                let key = SigningKey::from_bytes(&seed);
                seed.zeroize();
                Ok(SigningKeypair::Ed25519(Ed25519Signer { key }))
            }
            SignatureScheme::RsaPss => {
                let private = self.generate_rsa()?;
                let public = RsaPublic::from_key(RsaPublicKey::from(&private), "rsa-pss")?;
                Ok(SigningKeypair::RsaPss(RsaPssSigner {
                    key: rsa::pss::SigningKey::<Sha256>::new(private),
                    public,
                }))
            }
        }
    }

    /// Generate a key-agreement keypair for the configured wrap scheme.
    pub fn generate_agreement_keypair(&self) -> Result<AgreementKeypair, KeyError> {
        match self.suite.key_wrap {
            KeyWrapScheme::X25519Box => {
                let mut seed = random_nonce::<32>()
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                let secret = StaticSecret::from(seed);
                seed.zeroize();
                let public = X25519PublicKey::from(&secret);
                Ok(AgreementKeypair::X25519(X25519Box { secret, public }))
            }
            KeyWrapScheme::RsaOaep => {
                let key = self.generate_rsa()?;
                let public = RsaPublic::from_key(RsaPublicKey::from(&key), "rsa-oaep")?;
                Ok(AgreementKeypair::RsaOaep(RsaOaepWrap { key, public }))
            }
        }
    }

    /// Public half of a signing keypair in wire format.
    pub fn export_public(&self, keypair: &SigningKeypair) -> Vec<u8> {
        keypair.export_public()
    }

    /// Public half of a key-agreement keypair in wire format.
    pub fn export_agreement_public(&self, keypair: &AgreementKeypair) -> Vec<u8> {
        keypair.export_public()
    }

    /// Parse a peer's signing public key under the configured scheme.
    pub fn parse_signing_public(&self, bytes: &[u8]) -> Result<SigningPublicKey, KeyError> {
        SigningPublicKey::from_bytes(self.suite.signature, bytes)
    }

    /// Parse a peer's key-agreement public key under the configured scheme.
    pub fn parse_agreement_public(&self, bytes: &[u8]) -> Result<AgreementPublicKey, KeyError> {
        AgreementPublicKey::from_bytes(self.suite.key_wrap, bytes)
    }

    fn generate_rsa(&self) -> Result<RsaPrivateKey, KeyError> {
        if !SUPPORTED_RSA_BITS.contains(&self.rsa_bits) {
            return Err(KeyError::UnsupportedModulus(self.rsa_bits));
        }
        RsaPrivateKey::new(&mut OsRng, self.rsa_bits).map_err(|e| KeyError::Generation(e.to_string()))
    }
}
