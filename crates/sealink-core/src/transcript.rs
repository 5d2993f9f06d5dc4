//! The exact texts each handshake signature covers.
//!
//! Fields are appended as base64 text in a fixed order. Since decoding is
//! strict, signing over re-encoded bytes and over the text as transmitted
//! give the same result.

use sealink_crypto::channel::EncryptedEnvelope;
use sealink_crypto::codec::SignedText;
use sealink_crypto::nonce::{FRESHNESS_NONCE_LEN, WRAP_NONCE_LEN};

/// Server identity proof: `b64(nonce)`.
pub fn identity_payload(nonce: &[u8; FRESHNESS_NONCE_LEN]) -> SignedText {
    let mut text = SignedText::new();
    text.append_bytes(nonce);
    text
}

/// Client registration: `b64(client box public key)`.
pub fn registration_payload(box_public_key: &[u8]) -> SignedText {
    let mut text = SignedText::new();
    text.append_bytes(box_public_key);
    text
}

/// Key material:
/// `b64(wrapNonce) || b64(wrappedKey) || b64(serverBoxPub) || b64(clientBoxPub)`
/// followed by `b64(greeting.nonce) || b64(greeting.ciphertext)` when a
/// greeting is attached.
pub fn key_material_transcript(
    wrap_nonce: &[u8; WRAP_NONCE_LEN],
    wrapped_key: &[u8],
    server_box_public_key: &[u8],
    client_box_public_key: &[u8],
    greeting: Option<&EncryptedEnvelope>,
) -> SignedText {
    let mut text = SignedText::new();
    text.append_bytes(wrap_nonce)
        .append_bytes(wrapped_key)
        .append_bytes(server_box_public_key)
        .append_bytes(client_box_public_key);
    if let Some(g) = greeting {
        text.append_bytes(&g.nonce).append_bytes(&g.ciphertext);
    }
    text
}
