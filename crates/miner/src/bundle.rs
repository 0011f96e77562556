//! The mined-block bundle.
//!
//! While a mining run is in flight the bundle accumulates statechain
//! blocks, transactions, diffs, and Merkle trees from concurrent image
//! groups. One mutex guards all four maps: each group batches its results
//! into a single critical section, and the lock is never held across any
//! I/O. At the end of the run the bundle is frozen into the immutable
//! [`MinedBlock`] handed to the node.

use crate::merkle::MerkleTree;
use caravel_types::error::MinerError;
use caravel_types::{Diff, MainchainBlock, StatechainBlock, Transaction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of one successful mining run.
///
/// The maps are keyed by the entities' bound hashes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MinedBlock {
    /// The freshly mined mainchain block.
    pub next_block: MainchainBlock,
    /// The parent the block was mined on, if any.
    pub previous_block: Option<MainchainBlock>,
    /// Statechain blocks committed under the new block's Merkle root.
    pub statechain_blocks: HashMap<String, StatechainBlock>,
    /// The transactions those statechain blocks executed.
    pub transactions: HashMap<String, Transaction>,
    /// The per-step diffs backing the statechain blocks.
    pub diffs: HashMap<String, Diff>,
    /// The Merkle trees committed by the new block, keyed by root.
    pub merkle_trees: HashMap<String, MerkleTree>,
}

/// One image group's batch of results, keyed and ready to insert.
struct GroupEntries {
    blocks: Vec<(String, StatechainBlock)>,
    transactions: Vec<(String, Transaction)>,
    diffs: Vec<(String, Diff)>,
}

#[derive(Debug, Default)]
struct Maps {
    statechain_blocks: HashMap<String, StatechainBlock>,
    transactions: HashMap<String, Transaction>,
    diffs: HashMap<String, Diff>,
    merkle_trees: HashMap<String, MerkleTree>,
}

/// The in-flight accumulator behind a single mutex.
#[derive(Debug, Default)]
pub(crate) struct Bundle {
    inner: Mutex<Maps>,
}

impl Bundle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits one image group's results in a single critical section.
    ///
    /// Every entity must carry a bound hash; an unbound hash here means an
    /// earlier pipeline step broke its contract.
    pub(crate) fn commit_group(
        &self,
        blocks: Vec<StatechainBlock>,
        transactions: Vec<Transaction>,
        diffs: Vec<Diff>,
    ) -> Result<(), MinerError> {
        // Key everything before taking the lock.
        let mut entries = GroupEntries {
            blocks: Vec::with_capacity(blocks.len()),
            transactions: Vec::with_capacity(transactions.len()),
            diffs: Vec::with_capacity(diffs.len()),
        };
        for block in blocks {
            let hash = block
                .block_hash
                .clone()
                .ok_or_else(|| MinerError::Internal("statechain block hash not bound".into()))?;
            entries.blocks.push((hash, block));
        }
        for tx in transactions {
            let hash = tx
                .tx_hash
                .clone()
                .ok_or_else(|| MinerError::Internal("transaction hash not bound".into()))?;
            entries.transactions.push((hash, tx));
        }
        for diff in diffs {
            let hash = diff
                .diff_hash
                .clone()
                .ok_or_else(|| MinerError::Internal("diff hash not bound".into()))?;
            entries.diffs.push((hash, diff));
        }

        let mut maps = self.inner.lock();
        maps.statechain_blocks.extend(entries.blocks);
        maps.transactions.extend(entries.transactions);
        maps.diffs.extend(entries.diffs);
        Ok(())
    }

    /// Stores a Merkle tree under its root.
    pub(crate) fn insert_tree(&self, tree: MerkleTree) {
        self.inner.lock().merkle_trees.insert(tree.root.clone(), tree);
    }

    /// Returns all committed statechain block hashes in ascending order,
    /// the canonical leaf order for the Merkle commitment.
    pub(crate) fn sorted_statechain_hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self.inner.lock().statechain_blocks.keys().cloned().collect();
        hashes.sort();
        hashes
    }

    /// Freezes the bundle into the immutable handoff value.
    ///
    /// Taken under the lock after all group work has joined, so the copy is
    /// a consistent snapshot.
    pub(crate) fn freeze(
        &self,
        next_block: MainchainBlock,
        previous_block: Option<MainchainBlock>,
    ) -> MinedBlock {
        let maps = self.inner.lock();
        MinedBlock {
            next_block,
            previous_block,
            statechain_blocks: maps.statechain_blocks.clone(),
            transactions: maps.transactions.clone(),
            diffs: maps.diffs.clone(),
            merkle_trees: maps.merkle_trees.clone(),
        }
    }
}
