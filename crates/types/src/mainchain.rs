//! The mainchain block entity.
//!
//! Mainchain blocks anchor statechain work: each one commits a Merkle root
//! over the statechain block hashes mined alongside it, and is secured by a
//! proof-of-work nonce search against a leading-zero difficulty target.

use crate::codec;
use crate::error::EntityError;
use crate::hashing;
use crate::hexutil;
use serde::{Deserialize, Serialize};

/// The mainchain image-hash sentinel.
///
/// The main chain is not backed by an image, so its `image_hash` is fixed to
/// the hex SHA-256 of the empty byte string.
pub const MAINCHAIN_IMAGE_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// The Merkle root committed when no statechain blocks were mined.
pub const EMPTY_MERKLE_ROOT: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// The difficulty encoded on the genesis block.
pub const GENESIS_DIFFICULTY: u64 = 1;

/// A proof-of-work block anchoring statechain commitments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MainchainBlock {
    /// The mainchain height, hex encoded; `0x0` is genesis.
    pub block_number: String,
    /// Unix seconds at block construction, hex encoded.
    pub block_time: String,
    /// Always [`MAINCHAIN_IMAGE_HASH`].
    pub image_hash: String,
    /// The Merkle root over the statechain block hashes committed here.
    pub state_blocks_merkle_hash: String,
    /// The previous mainchain block's hash.
    pub prev_block_hash: String,
    /// The 32-byte proof-of-work nonce, hex encoded.
    pub nonce: String,
    /// The required count of leading `0` hex characters on the block hash,
    /// hex encoded.
    pub difficulty: String,
    /// The encoded address of the miner that produced this block.
    pub miner_address: String,
    /// The canonical hash, once bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl MainchainBlock {
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

    /// Returns the decoded difficulty.
    pub fn difficulty_u64(&self) -> Result<u64, EntityError> {
        hexutil::decode_u64(&self.difficulty)
    }
}

/// Builds the fixed, hash-bound mainchain genesis block.
///
/// Every field is a constant, so all nodes derive an identical genesis hash.
pub fn genesis_block() -> Result<MainchainBlock, EntityError> {
    let mut block = MainchainBlock {
        block_number: hexutil::encode_u64(0),
        block_time: hexutil::encode_u64(0),
        image_hash: MAINCHAIN_IMAGE_HASH.to_string(),
        state_blocks_merkle_hash: EMPTY_MERKLE_ROOT.to_string(),
        prev_block_hash: EMPTY_MERKLE_ROOT.to_string(),
        nonce: hexutil::encode_bytes(&[0u8; 32]),
        difficulty: hexutil::encode_u64(GENESIS_DIFFICULTY),
        miner_address: String::new(),
        block_hash: None,
    };
    block.set_hash()?;
    Ok(block)
}

/// Verifies a mainchain block received from a peer.
///
/// Not yet implemented: every block is rejected, so callers must keep
/// verification disabled until the semantics land.
pub fn verify_block(_block: &MainchainBlock) -> Result<bool, EntityError> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic() {
        let a = genesis_block().unwrap();
        let b = genesis_block().unwrap();
        assert_eq!(a.block_hash, b.block_hash);
        assert_eq!(a.image_hash, MAINCHAIN_IMAGE_HASH);
        assert_eq!(a.block_number_u64().unwrap(), 0);
    }

    #[test]
    fn hash_binding_is_stable() {
        let mut block = genesis_block().unwrap();
        let bound = block.block_hash.clone().unwrap();
        assert_eq!(block.calc_hash().unwrap(), bound);

        block.nonce = hexutil::encode_bytes(&[1u8; 32]);
        assert_ne!(block.calc_hash().unwrap(), bound);
    }

    #[test]
    fn sentinel_is_the_empty_hash() {
        assert_eq!(
            MAINCHAIN_IMAGE_HASH,
            crate::hashing::hash_to_hex_string(b"")
        );
    }

    #[test]
    fn hex_framing_round_trips() {
        let block = genesis_block().unwrap();
        let s = codec::serialize_string(&block).unwrap();
        assert_eq!(codec::deserialize_string::<MainchainBlock>(&s).unwrap(), block);
    }
}
