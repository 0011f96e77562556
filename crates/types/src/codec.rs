//! The canonical JSON codec for all hashed and transported entities.
//!
//! The canonical form is compact JSON with fields in struct-declaration
//! order and unset hash fields elided. Every entity hash is computed over
//! these bytes, and every store write uses them, so all components must go
//! through this module rather than calling `serde_json` directly.

use crate::error::EntityError;
use crate::hexutil;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value into its canonical compact JSON bytes.
pub fn to_canonical_json<T: Serialize>(v: &T) -> Result<Vec<u8>, EntityError> {
    serde_json::to_vec(v).map_err(|e| EntityError::Serialization(e.to_string()))
}

/// Decodes a value from canonical JSON bytes.
pub fn from_canonical_json<T: DeserializeOwned>(b: &[u8]) -> Result<T, EntityError> {
    serde_json::from_slice(b).map_err(|e| EntityError::Serialization(e.to_string()))
}

/// Encodes a value as `0x`-prefixed hex over its canonical JSON.
///
/// This is the wire framing used when entities are written to the object
/// store.
pub fn serialize_string<T: Serialize>(v: &T) -> Result<String, EntityError> {
    Ok(hexutil::encode_bytes(&to_canonical_json(v)?))
}

/// Decodes a value from the `0x`-prefixed hex framing of its canonical JSON.
pub fn deserialize_string<T: DeserializeOwned>(s: &str) -> Result<T, EntityError> {
    from_canonical_json(&hexutil::decode_bytes(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        b: u32,
        a: String,
    }

    #[test]
    fn canonical_json_is_compact_and_declaration_ordered() {
        let v = Sample {
            b: 7,
            a: "x".into(),
        };
        let bytes = to_canonical_json(&v).unwrap();
        assert_eq!(bytes, br#"{"b":7,"a":"x"}"#);
    }

    #[test]
    fn hex_framing_round_trips() {
        let v = Sample {
            b: 1,
            a: "state".into(),
        };
        let s = serialize_string(&v).unwrap();
        assert!(s.starts_with("0x"));
        assert_eq!(deserialize_string::<Sample>(&s).unwrap(), v);
    }
}
