//! The hash to CID codec.
//!
//! Entity fields reference other entities by bare hex hash; the store keys
//! objects by CID. These two functions are the only conversion between the
//! forms, so a hash read out of a block field always resolves to the same
//! key on every node.

use caravel_types::error::StoreError;
use caravel_types::hashing::HEX_HASH_LEN;
use cid::Cid;
use multihash::Multihash;

/// The multicodec for stored entity payloads (raw bytes).
pub const RAW_CODEC: u64 = 0x55;

/// The multihash code for SHA2-256, the digest entity hashes carry.
pub const SHA2_256_CODE: u64 = 0x12;

/// Converts an entity's hex hash into the CID it is stored under.
pub fn cid_by_hash(hash_hex: &str) -> Result<Cid, StoreError> {
    if hash_hex.len() != HEX_HASH_LEN {
        return Err(StoreError::InvalidCid(hash_hex.to_string()));
    }
    let digest = hex::decode(hash_hex).map_err(|_| StoreError::InvalidCid(hash_hex.to_string()))?;
    let mh = Multihash::<64>::wrap(SHA2_256_CODE, &digest)
        .map_err(|e| StoreError::InvalidCid(e.to_string()))?;
    Ok(Cid::new_v1(RAW_CODEC, mh))
}

/// Recovers the hex hash an object's CID was derived from.
pub fn hash_by_cid(cid: &Cid) -> String {
    hex::encode(cid.hash().digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_types::hashing;

    #[test]
    fn hash_round_trips_through_cid() {
        let hash = hashing::hash_to_hex_string(b"some entity bytes");
        let cid = cid_by_hash(&hash).unwrap();
        assert_eq!(hash_by_cid(&cid), hash);
    }

    #[test]
    fn codec_is_deterministic() {
        let hash = hashing::hash_to_hex_string(b"x");
        assert_eq!(
            cid_by_hash(&hash).unwrap().to_string(),
            cid_by_hash(&hash).unwrap().to_string()
        );
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!(cid_by_hash("abc").is_err());
        assert!(cid_by_hash(&"g".repeat(64)).is_err());
    }
}
