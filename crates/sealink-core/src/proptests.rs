use proptest::prelude::*;

use sealink_crypto::channel::EncryptedEnvelope;
use sealink_crypto::codec::{self, CodecError};
use sealink_crypto::nonce::{AEAD_NONCE_LEN, FRESHNESS_NONCE_LEN, WRAP_NONCE_LEN};
use sealink_crypto::{CipherSuite, KeyManager};

use crate::messages::EnvelopeMessage;
use crate::transcript::{identity_payload, key_material_transcript};

fn bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 1..max)
}

fn envelope_strategy() -> impl Strategy<Value = EncryptedEnvelope> {
    (any::<[u8; AEAD_NONCE_LEN]>(), bytes(256), bytes(96)).prop_map(|(nonce, ciphertext, signature)| {
        EncryptedEnvelope {
            ciphertext,
            nonce,
            signature,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_transcript_binds_every_field(
        wrap_nonce in any::<[u8; WRAP_NONCE_LEN]>(),
        wrapped in bytes(64),
        server_box in bytes(64),
        client_box in bytes(64),
        field in 0usize..4,
        at in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let original = key_material_transcript(&wrap_nonce, &wrapped, &server_box, &client_box, None);

        let (mut n, mut w, mut s, mut c) = (wrap_nonce, wrapped.clone(), server_box.clone(), client_box.clone());
        match field {
            0 => { let i = at.index(n.len()); n[i] ^= 1 << bit; }
            1 => { let i = at.index(w.len()); w[i] ^= 1 << bit; }
            2 => { let i = at.index(s.len()); s[i] ^= 1 << bit; }
            _ => { let i = at.index(c.len()); c[i] ^= 1 << bit; }
        }
        let altered = key_material_transcript(&n, &w, &s, &c, None);
        prop_assert_ne!(original.as_bytes(), altered.as_bytes());
    }

    #[test]
    fn prop_greeting_only_appends(
        wrap_nonce in any::<[u8; WRAP_NONCE_LEN]>(),
        wrapped in bytes(64),
        server_box in bytes(64),
        client_box in bytes(64),
        greeting in envelope_strategy(),
    ) {
        let bare = key_material_transcript(&wrap_nonce, &wrapped, &server_box, &client_box, None);
        let with = key_material_transcript(&wrap_nonce, &wrapped, &server_box, &client_box, Some(&greeting));
        let tail = format!("{}{}", codec::encode(&greeting.nonce), codec::encode(&greeting.ciphertext));
        prop_assert_eq!(with.as_str(), format!("{}{}", bare.as_str(), tail));
    }

    #[test]
    fn prop_envelope_message_survives_json(envelope in envelope_strategy()) {
        let wire = serde_json::to_string(&EnvelopeMessage::from_envelope(&envelope)).unwrap();
        let parsed: EnvelopeMessage = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(parsed.to_envelope().unwrap(), envelope);
    }

    #[test]
    fn prop_wrong_nonce_length_rejected(len in (0usize..40).prop_filter("not 12", |l| *l != AEAD_NONCE_LEN)) {
        let message = EnvelopeMessage {
            nonce: codec::encode(&vec![7u8; len]),
            ciphertext: codec::encode(b"ct"),
            signature: codec::encode(b"sig"),
        };
        prop_assert_eq!(
            message.to_envelope(),
            Err(CodecError::InvalidLength { field: "nonce", expected: AEAD_NONCE_LEN, got: len })
        );
    }

    #[test]
    fn prop_identity_proof_is_nonce_specific(
        signed in any::<[u8; FRESHNESS_NONCE_LEN]>(),
        other in any::<[u8; FRESHNESS_NONCE_LEN]>(),
    ) {
        prop_assume!(signed != other);
        let identity = KeyManager::new(CipherSuite::curve25519())
            .generate_signing_keypair()
            .unwrap();
        let signature = identity.sign(identity_payload(&signed).as_bytes()).unwrap();
        let public = identity.public_key();
        prop_assert!(public.verify(identity_payload(&signed).as_bytes(), &signature).is_ok());
        prop_assert!(public.verify(identity_payload(&other).as_bytes(), &signature).is_err());
    }
}
