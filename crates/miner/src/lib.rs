#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # Caravel Miner
//!
//! The mining pipeline of a single node. One [`Miner`] instance makes one
//! mainchain-block attempt: it groups pending transactions by image,
//! rebuilds each image's state by replaying its statechain diffs, runs the
//! transactions through the sandbox, commits the resulting statechain
//! blocks and diffs into a [`MinedBlock`] bundle, seals them under a Merkle
//! root, and searches for a nonce that clears the difficulty target.
//!
//! Image groups are isolated: a group that fails is dropped from this
//! attempt and its transactions stay in the mempool, while every other
//! group still commits.

/// The accumulating bundle a mining run commits into.
pub mod bundle;
/// The binary Merkle tree over statechain block hashes.
pub mod merkle;
/// The mining pipeline itself.
pub mod service;

pub use bundle::MinedBlock;
pub use merkle::MerkleTree;
pub use service::{Miner, MinerProps, MinerResult};

use caravel_types::error::MinerError;
use caravel_types::hashing;

/// Tests a block hash against a difficulty target.
///
/// `difficulty` is the required number of leading `'0'` hex characters.
/// Errors only on malformed hashes; a difficulty beyond the hash length is
/// simply unreachable.
pub fn check_hash_against_difficulty(hash: &str, difficulty: u64) -> Result<bool, MinerError> {
    if !hashing::is_valid_hex_hash(hash) {
        return Err(MinerError::Internal(format!(
            "malformed block hash: {hash:?}"
        )));
    }
    let needed = difficulty as usize;
    if needed > hashing::HEX_HASH_LEN {
        return Ok(false);
    }
    Ok(hash.bytes().take(needed).all(|b| b == b'0'))
}
