//! Text codec for wire fields.
//!
//! Every raw byte value (keys, nonces, ciphertexts, signatures) travels as
//! standard padded base64. Decoding is strict: padding is required and
//! non-canonical trailing bits are rejected, so `encode(decode(s)) == s` for
//! every accepted `s`. Signatures are computed over the encoded text, which
//! makes re-encoding on the verifier side equivalent to using the text as it
//! was transmitted.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Error type for codec operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("field `{field}` is not canonical base64")]
    InvalidBase64 { field: &'static str },
    #[error("field `{field}` has invalid length: expected {expected}, got {got}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Encode raw bytes as standard padded base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 text field.
pub fn decode(field: &'static str, text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text)
        .map_err(|_| CodecError::InvalidBase64 { field })
}

/// Decode a base64 text field that must hold exactly `N` bytes.
pub fn decode_array<const N: usize>(field: &'static str, text: &str) -> Result<[u8; N], CodecError> {
    let bytes = decode(field, text)?;
    let got = bytes.len();
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        field,
        expected: N,
        got,
    })
}

/// Interpret decrypted bytes as UTF-8 text for display.
pub fn utf8_decode(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

/// Builder for the exact text a signature covers.
///
/// Fields are appended in order as their base64 text, with no separators.
/// Signer and verifier must append the same fields in the same order.
#[derive(Clone, Debug, Default)]
pub struct SignedText {
    buf: String,
}

impl SignedText {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(256),
        }
    }

    /// Append raw bytes in their encoded form.
    pub fn append_bytes(&mut self, data: &[u8]) -> &mut Self {
        STANDARD.encode_string(data, &mut self.buf);
        self
    }

    /// Append a field that is already in its transmitted text form.
    pub fn append_encoded(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(text);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// The UTF-8 bytes that are signed.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }
}
