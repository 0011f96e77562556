//! The per-image statechain block entity.
//!
//! Each block commits one state transition of one container image: the
//! transaction that caused it, the diff that produces its state from the
//! previous block's state, and the hash of the resulting raw state bytes.

use crate::codec;
use crate::error::EntityError;
use crate::hashing;
use crate::hexutil;
use serde::{Deserialize, Serialize};

/// The `prev_block_hash` sentinel on a statechain genesis block.
pub const GENESIS_PREV_BLOCK_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One state transition of one container image.
///
/// For a given `image_hash`, blocks form an acyclic chain through
/// `prev_block_hash`, densely numbered from the genesis block at number 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatechainBlock {
    /// The block height on this image's chain, hex encoded; `0x0` is genesis.
    pub block_number: String,
    /// Unix seconds at block construction, hex encoded.
    pub block_time: String,
    /// The container image whose state this block advances.
    pub image_hash: String,
    /// The transaction that produced this transition.
    pub tx_hash: String,
    /// The previous block on this image's chain, or the genesis sentinel.
    pub prev_block_hash: String,
    /// The hash of the diff producing this block's state from the previous
    /// block's state.
    pub state_prev_diff_hash: String,
    /// The hash of the raw state bytes after this transition.
    pub state_current_hash: String,
    /// The canonical hash, once bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl StatechainBlock {
    /// Computes the canonical hash with the hash field elided.
    pub fn calc_hash(&self) -> Result<String, EntityError> {
        let unbound = Self {
            block_hash: None,
            ..self.clone()
        };
        Ok(hashing::hash_to_hex_string(&codec::to_canonical_json(
            &unbound,
        )?))
    }

    /// Binds the canonical hash onto the block.
    pub fn set_hash(&mut self) -> Result<(), EntityError> {
        self.block_hash = Some(self.calc_hash()?);
        Ok(())
    }

    /// Returns the bound hash, or computes the canonical hash if unbound.
    pub fn hash(&self) -> Result<String, EntityError> {
        match &self.block_hash {
            Some(h) => Ok(h.clone()),
            None => self.calc_hash(),
        }
    }

    /// Returns the decoded block height.
    pub fn block_number_u64(&self) -> Result<u64, EntityError> {
        hexutil::decode_u64(&self.block_number)
    }

    /// Returns true if this is the image's genesis block.
    pub fn is_genesis(&self) -> bool {
        self.block_number == hexutil::encode_u64(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> StatechainBlock {
        StatechainBlock {
            block_number: hexutil::encode_u64(3),
            block_time: hexutil::encode_u64(1_700_000_000),
            image_hash: "1".repeat(64),
            tx_hash: "2".repeat(64),
            prev_block_hash: "3".repeat(64),
            state_prev_diff_hash: "4".repeat(64),
            state_current_hash: "5".repeat(64),
            block_hash: None,
        }
    }

    #[test]
    fn hash_binding_is_stable() {
        let mut b = block();
        b.set_hash().unwrap();
        assert_eq!(b.block_hash.clone().unwrap(), b.calc_hash().unwrap());
    }

    #[test]
    fn bound_hash_excludes_itself() {
        let mut b = block();
        let before = b.calc_hash().unwrap();
        b.set_hash().unwrap();
        assert_eq!(b.calc_hash().unwrap(), before);
    }

    #[test]
    fn genesis_detection() {
        let mut b = block();
        assert!(!b.is_genesis());
        b.block_number = hexutil::encode_u64(0);
        assert!(b.is_genesis());
        assert_eq!(b.block_number_u64().unwrap(), 0);
    }
}
