use std::fmt;

use crate::models::error::StreamError;

/// AES-128 key size in bytes.
pub const KEY_LEN: usize = 16;

/// 16-byte AES key derived from the pairing secret.
///
/// Derivation is a fixed public transform, not a KDF: the secret is copied to
/// the front of the key and its last byte repeated to fill the rest. Both ends
/// derive the same key from the code displayed on the server.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_pairing_secret(secret: &str) -> Result<Self, StreamError> {
        let bytes = secret.as_bytes();
        let Some(&last) = bytes.last() else {
            return Err(StreamError::Configuration("pairing secret is empty".into()));
        };
        if bytes.len() > KEY_LEN {
            return Err(StreamError::Configuration(format!(
                "pairing secret is {} bytes, at most {} allowed",
                bytes.len(),
                KEY_LEN
            )));
        }

        let mut key = [last; KEY_LEN];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Never print key material.
impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_repeats_last_byte() {
        let key = SymmetricKey::from_pairing_secret("123").unwrap();
        assert_eq!(key.as_bytes(), b"1233333333333333");
    }

    #[test]
    fn six_digit_code() {
        let key = SymmetricKey::from_pairing_secret("004217").unwrap();
        assert_eq!(key.as_bytes(), b"0042177777777777");
    }

    #[test]
    fn full_length_secret_is_unchanged() {
        let key = SymmetricKey::from_pairing_secret("0123456789abcdef").unwrap();
        assert_eq!(key.as_bytes(), b"0123456789abcdef");
    }

    #[test]
    fn oversized_secret_is_rejected() {
        let err = SymmetricKey::from_pairing_secret("0123456789abcdefg").unwrap_err();
        assert!(matches!(err, StreamError::Configuration(_)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            SymmetricKey::from_pairing_secret(""),
            Err(StreamError::Configuration(_))
        ));
    }

    #[test]
    fn debug_hides_key() {
        let key = SymmetricKey::from_pairing_secret("123").unwrap();
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }
}
