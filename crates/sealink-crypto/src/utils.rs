//! Constant-time comparison and key fingerprints.
//!
//! Constant-time comparison is used wherever a secret or a pinned public key
//! is compared against a value received from the peer.

use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};

/// Compare two byte slices in constant time.
///
/// Slices of different lengths compare unequal; only the length is leaked.
///
/// ```rust
/// use sealink_crypto::utils::constant_time_compare;
///
/// let pinned = [7u8; 32];
/// assert!(constant_time_compare(&pinned, &[7u8; 32]));
/// assert!(!constant_time_compare(&pinned, &[7u8; 31]));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two fixed-size arrays in constant time.
pub fn constant_time_compare_array<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    constant_time_eq(a, b)
}

/// Short hex fingerprint of a public key for logs: first 8 bytes of SHA-256.
pub fn fingerprint(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_equal_and_different() {
        assert!(constant_time_compare(b"server key", b"server key"));
        assert!(!constant_time_compare(b"server key", b"server kez"));
    }

    #[test]
    fn test_compare_different_length() {
        assert!(!constant_time_compare(b"key", b"key material"));
        assert!(!constant_time_compare(b"", b"x"));
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        let fp = fingerprint(&[1u8; 32]);
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, fingerprint(&[1u8; 32]));
        assert_ne!(fp, fingerprint(&[2u8; 32]));
    }

    #[test]
    fn test_compare_array_key_sized() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        assert!(constant_time_compare_array(&a, &b));
        b[31] = 1;
        assert!(!constant_time_compare_array(&a, &b));
    }
}
