//! sealink cryptographic building blocks.
//!
//! - [`codec`]: base64 text encoding of raw bytes and the signed-text builder
//! - [`suite`]: the algorithm selection both parties agree on
//! - [`keys`]: signing and key-agreement keypairs
//! - [`wrap`]: public-key wrapping of the shared symmetric key
//! - [`symmetric`]: the shared key and its AEAD
//! - [`channel`]: signed, encrypted application envelopes

#![forbid(unsafe_code)]

pub mod codec;
pub mod suite;
pub mod nonce;
pub mod keys;
pub mod wrap;
pub mod symmetric;
pub mod channel;
pub mod utils;

#[cfg(test)]
mod proptests;

pub use channel::{ChannelError, EncryptedEnvelope, SecureChannel};
pub use keys::{
    AgreementKeypair, AgreementPublicKey, KeyError, KeyManager, KeyRole, SigningKeypair,
    SigningPublicKey,
};
pub use suite::{AeadAlgorithm, CipherSuite, KeyWrapScheme, SignatureScheme};
pub use symmetric::SymmetricKey;
