//! JSON wire messages.
//!
//! Field names are camelCase and every byte field is standard base64 text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sealink_crypto::channel::EncryptedEnvelope;
use sealink_crypto::codec::{self, CodecError};
use sealink_crypto::nonce::AEAD_NONCE_LEN;
use sealink_crypto::CipherSuite;

/// Server identity proof: a fresh nonce signed by the server signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdentity {
    pub sign_public_key: String,
    pub nonce: String,
    /// Covers `nonce` as transmitted.
    pub signature: String,
}

/// Client registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub suite: CipherSuite,
    pub sign_public_key: String,
    pub box_public_key: String,
    /// Covers `boxPublicKey` as transmitted.
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub session_id: Uuid,
}

/// Signed key material issued by the server for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub server_sign_public_key: String,
    pub server_box_public_key: String,
    pub wrap_nonce: String,
    pub wrapped_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<EnvelopeMessage>,
    /// Covers the key material transcript.
    pub signature: String,
}

/// An [`EncryptedEnvelope`] in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMessage {
    pub nonce: String,
    pub ciphertext: String,
    pub signature: String,
}

impl EnvelopeMessage {
    pub fn from_envelope(envelope: &EncryptedEnvelope) -> Self {
        Self {
            nonce: codec::encode(&envelope.nonce),
            ciphertext: codec::encode(&envelope.ciphertext),
            signature: codec::encode(&envelope.signature),
        }
    }

    pub fn to_envelope(&self) -> Result<EncryptedEnvelope, CodecError> {
        Ok(EncryptedEnvelope {
            nonce: codec::decode_array::<AEAD_NONCE_LEN>("nonce", &self.nonce)?,
            ciphertext: codec::decode("ciphertext", &self.ciphertext)?,
            signature: codec::decode("signature", &self.signature)?,
        })
    }
}

impl From<&EncryptedEnvelope> for EnvelopeMessage {
    fn from(envelope: &EncryptedEnvelope) -> Self {
        Self::from_envelope(envelope)
    }
}

/// Acknowledges an accepted client message by echoing its nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    pub nonce: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_field_names() {
        let req = RegisterRequest {
            suite: CipherSuite::curve25519(),
            sign_public_key: "c2lnbg==".into(),
            box_public_key: "Ym94".into(),
            signature: "c2ln".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["suite"], "ed25519+x25519-box+aes256gcm");
        assert_eq!(json["signPublicKey"], "c2lnbg==");
        assert_eq!(json["boxPublicKey"], "Ym94");
    }

    #[test]
    fn test_key_material_without_greeting_omits_field() {
        let km = KeyMaterial {
            server_sign_public_key: String::new(),
            server_box_public_key: String::new(),
            wrap_nonce: String::new(),
            wrapped_key: String::new(),
            greeting: None,
            signature: String::new(),
        };
        let json = serde_json::to_string(&km).unwrap();
        assert!(!json.contains("greeting"));
        let back: KeyMaterial = serde_json::from_str(&json).unwrap();
        assert_eq!(back, km);
    }

    #[test]
    fn test_unknown_suite_rejected_on_parse() {
        let json = r#"{"suite":"ed25519+x25519-box+rot13","signPublicKey":"","boxPublicKey":"","signature":""}"#;
        assert!(serde_json::from_str::<RegisterRequest>(json).is_err());
    }

    #[test]
    fn test_envelope_message_rejects_short_nonce() {
        let msg = EnvelopeMessage {
            nonce: codec::encode(&[0u8; 8]),
            ciphertext: codec::encode(b"ct"),
            signature: codec::encode(b"sig"),
        };
        assert!(matches!(
            msg.to_envelope(),
            Err(CodecError::InvalidLength { field: "nonce", .. })
        ));
    }

    #[test]
    fn test_envelope_message_conversion() {
        let env = EncryptedEnvelope {
            ciphertext: vec![1, 2, 3],
            nonce: [4u8; AEAD_NONCE_LEN],
            signature: vec![5u8; 64],
        };
        let msg = EnvelopeMessage::from(&env);
        assert_eq!(msg.to_envelope().unwrap(), env);
    }

    #[test]
    fn test_register_ack_session_id_is_string() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(RegisterAck { session_id: id }).unwrap();
        assert_eq!(json["sessionId"], id.to_string());
    }
}
