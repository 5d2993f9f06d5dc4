//! Per-peer session state.

use sealink_crypto::{AgreementPublicKey, SigningPublicKey, SymmetricKey};
use zeroize::Zeroize;

/// What one party knows about its peer.
///
/// Created empty and filled in by the handshake steps. A session is
/// established only once the shared key is present and the peer's signature
/// has verified.
#[derive(Debug, Default)]
pub struct SessionState {
    pub peer_signing_public_key: Option<SigningPublicKey>,
    pub peer_encryption_public_key: Option<AgreementPublicKey>,
    pub shared_symmetric_key: Option<SymmetricKey>,
    pub last_received_nonce: Option<Vec<u8>>,
    pub peer_verified: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_established(&self) -> bool {
        self.peer_verified && self.shared_symmetric_key.is_some()
    }

    /// Drop all peer material. The symmetric key zeroizes itself on drop.
    pub fn teardown(&mut self) {
        self.shared_symmetric_key = None;
        if let Some(nonce) = self.last_received_nonce.as_mut() {
            nonce.zeroize();
        }
        self.last_received_nonce = None;
        self.peer_encryption_public_key = None;
        self.peer_signing_public_key = None;
        self.peer_verified = false;
    }
}
