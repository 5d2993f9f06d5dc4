use proptest::prelude::*;

use crate::channel::{decrypt, encrypt, ChannelError};
use crate::codec::{self, SignedText};
use crate::keys::KeyManager;
use crate::suite::{AeadAlgorithm, CipherSuite};
use crate::symmetric::SymmetricKey;

fn aead_strategy() -> impl Strategy<Value = AeadAlgorithm> {
    prop_oneof![
        Just(AeadAlgorithm::Aes256Gcm),
        Just(AeadAlgorithm::ChaCha20Poly1305)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_envelope_round_trip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        key_bytes in any::<[u8; 32]>(),
        aead in aead_strategy(),
    ) {
        let signer = KeyManager::new(CipherSuite::curve25519())
            .generate_signing_keypair()
            .unwrap();
        let key = SymmetricKey::from_bytes(key_bytes, aead);

        let env = encrypt(&plaintext, &key, &signer).unwrap();
        prop_assert_eq!(decrypt(&env, &key, &signer.public_key()).unwrap(), plaintext);
    }

    #[test]
    fn prop_tampered_ciphertext_fails_authentication(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        flip_index in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let signer = KeyManager::new(CipherSuite::curve25519())
            .generate_signing_keypair()
            .unwrap();
        let key = SymmetricKey::from_bytes([0x42; 32], AeadAlgorithm::Aes256Gcm);

        let mut env = encrypt(&plaintext, &key, &signer).unwrap();
        let i = flip_index.index(env.ciphertext.len());
        env.ciphertext[i] ^= 1 << flip_bit;
        prop_assert_eq!(
            decrypt(&env, &key, &signer.public_key()),
            Err(ChannelError::Authentication)
        );
    }

    #[test]
    fn prop_signed_text_deterministic(
        fields in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..6),
    ) {
        let mut a = SignedText::new();
        let mut b = SignedText::new();
        for f in &fields {
            a.append_bytes(f);
            b.append_encoded(&codec::encode(f));
        }
        prop_assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn prop_codec_round_trip_is_canonical(data in proptest::collection::vec(any::<u8>(), 0..128)) {
        let text = codec::encode(&data);
        let decoded = codec::decode("data", &text).unwrap();
        prop_assert_eq!(&decoded, &data);
        prop_assert_eq!(codec::encode(&decoded), text);
    }
}
