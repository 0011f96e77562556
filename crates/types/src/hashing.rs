//! SHA-256 hashing and the hex digest form bound onto entities.
//!
//! Every entity hash in Caravel is the lowercase hex encoding of the SHA-256
//! digest of the entity's canonical JSON bytes. Keeping the digest and its
//! framing in one place means a hash computed anywhere in the workspace is
//! comparable byte-for-byte with a hash read off the wire.

use sha2::{Digest, Sha256};

/// The length in characters of a hex-encoded SHA-256 digest.
pub const HEX_HASH_LEN: usize = 64;

/// Returns the SHA-256 digest of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Returns the lowercase hex encoding of the SHA-256 digest of `bytes`.
///
/// This is the form stored in `*_hash` fields on entities.
pub fn hash_to_hex_string(bytes: &[u8]) -> String {
    hex::encode(hash_bytes(bytes))
}

/// Returns true if `s` is a well-formed lowercase hex SHA-256 digest.
pub fn is_valid_hex_hash(s: &str) -> bool {
    s.len() == HEX_HASH_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        // The SHA-256 of the empty byte string doubles as the mainchain
        // image-hash sentinel.
        assert_eq!(
            hash_to_hex_string(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(hash_to_hex_string(b"abc"), hash_to_hex_string(b"abc"));
        assert_ne!(hash_to_hex_string(b"abc"), hash_to_hex_string(b"abd"));
    }

    #[test]
    fn validates_hex_form() {
        assert!(is_valid_hex_hash(&hash_to_hex_string(b"x")));
        assert!(!is_valid_hex_hash("deadbeef"));
        assert!(!is_valid_hex_hash(&"Z".repeat(64)));
    }
}
