//! `0x`-prefixed hex encoding for integers and opaque byte strings.
//!
//! Block numbers, timestamps, difficulties, and nonces are carried on
//! entities as `0x`-prefixed hex strings so the canonical JSON stays free of
//! integer-width concerns. Entity hashes do not use this framing; they are
//! bare 64-character digests (see [`crate::hashing`]).

use crate::error::EntityError;

/// Encodes a u64 as a minimal `0x`-prefixed hex string (`0` becomes `0x0`).
pub fn encode_u64(n: u64) -> String {
    format!("{:#x}", n)
}

/// Decodes a `0x`-prefixed hex string into a u64.
pub fn decode_u64(s: &str) -> Result<u64, EntityError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| EntityError::InvalidHex(s.to_string()))?;
    u64::from_str_radix(digits, 16).map_err(|_| EntityError::InvalidHex(s.to_string()))
}

/// Encodes bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_bytes(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}

/// Decodes a `0x`-prefixed hex string into bytes.
pub fn decode_bytes(s: &str) -> Result<Vec<u8>, EntityError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| EntityError::InvalidHex(s.to_string()))?;
    hex::decode(digits).map_err(|_| EntityError::InvalidHex(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trip() {
        for n in [0u64, 1, 5, 255, 1 << 40, u64::MAX] {
            assert_eq!(decode_u64(&encode_u64(n)).unwrap(), n);
        }
        assert_eq!(encode_u64(0), "0x0");
        assert_eq!(encode_u64(255), "0xff");
    }

    #[test]
    fn bytes_round_trip() {
        let b = vec![0u8, 1, 2, 0xff];
        assert_eq!(decode_bytes(&encode_bytes(&b)).unwrap(), b);
        assert_eq!(encode_bytes(&[]), "0x");
    }

    #[test]
    fn rejects_unprefixed_and_malformed() {
        assert!(decode_u64("ff").is_err());
        assert!(decode_u64("0xzz").is_err());
        assert!(decode_bytes("abcd").is_err());
    }
}
