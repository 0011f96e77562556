//! The mining pipeline.
//!
//! One [`Miner`] drives one mainchain-block attempt through four phases:
//! group pending transactions by image, build each image's next statechain
//! blocks (sequentially or one task per image), seal the committed block
//! hashes under a Merkle root, and search nonces until the block hash
//! clears the difficulty. Whatever the outcome, it is delivered on the
//! result channel.

use crate::bundle::{Bundle, MinedBlock};
use crate::check_hash_against_difficulty;
use crate::merkle::{self, STATECHAIN_BLOCKS_KIND};
use caravel_diff::DiffEngine;
use caravel_sandbox::{PlayConfig, Sandbox};
use caravel_store::{cid_by_hash, BlockStore};
use caravel_types::error::{DiffError, ErrorCode, MinerError};
use caravel_types::mainchain::{EMPTY_MERKLE_ROOT, MAINCHAIN_IMAGE_HASH};
use caravel_types::statechain::GENESIS_PREV_BLOCK_HASH;
use caravel_types::{
    codec, hashing, hexutil, Diff, MainchainBlock, StatechainBlock, Transaction, INVOKE_METHOD,
};
use rand::RngCore;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The outcome one mining attempt delivers on its result channel.
pub type MinerResult = Result<MinedBlock, MinerError>;

/// Default cap on transactions mined per image group per block.
pub const DEFAULT_MAX_TXS_PER_GROUP: usize = 128;

const STATE_FILE: &str = "state.txt";
const NEXT_STATE_FILE: &str = "state.next.txt";
const PATCH_FILE: &str = "state.patch";

/// Construction inputs for one mining attempt.
#[derive(Debug, Clone)]
pub struct MinerProps {
    /// The head the new block extends, or `None` to mine the first block.
    pub previous_block: Option<MainchainBlock>,
    /// Required count of leading `'0'` hex characters on the block hash.
    pub difficulty: u64,
    /// The encoded address credited as the block's miner.
    pub encoded_miner_address: String,
    /// Snapshot of pending transactions to mine.
    pub pending_transactions: Vec<Transaction>,
    /// Build image groups as parallel tasks instead of sequentially.
    pub async_groups: bool,
    /// Cap on transactions mined per image group; overflow stays pending.
    pub max_txs_per_group: usize,
    /// Unix-seconds timestamp stamped on every block this attempt builds.
    /// `None` captures the wall clock at construction.
    pub block_time: Option<u64>,
}

/// State shared between the pipeline and its per-image tasks.
struct Inner {
    previous_block: Option<MainchainBlock>,
    difficulty: u64,
    block_time: u64,
    store: Arc<dyn BlockStore>,
    sandbox: Arc<dyn Sandbox>,
    engine: Arc<dyn DiffEngine>,
    cancel: CancellationToken,
    bundle: Bundle,
}

/// One mainchain-block mining attempt.
pub struct Miner {
    inner: Arc<Inner>,
    pending: Vec<Transaction>,
    async_groups: bool,
    max_txs_per_group: usize,
    next_block: MainchainBlock,
    channel: mpsc::Sender<MinerResult>,
}

impl Miner {
    /// Builds a miner and bootstraps the successor block it will mine.
    pub fn new(
        props: MinerProps,
        store: Arc<dyn BlockStore>,
        sandbox: Arc<dyn Sandbox>,
        engine: Arc<dyn DiffEngine>,
        cancel: CancellationToken,
        channel: mpsc::Sender<MinerResult>,
    ) -> Result<Self, MinerError> {
        let block_time = props.block_time.unwrap_or_else(unix_now);
        let next_block = bootstrap_next_block(&props, block_time)?;
        Ok(Self {
            inner: Arc::new(Inner {
                previous_block: props.previous_block,
                difficulty: props.difficulty,
                block_time,
                store,
                sandbox,
                engine,
                cancel,
                bundle: Bundle::new(),
            }),
            pending: props.pending_transactions,
            async_groups: props.async_groups,
            max_txs_per_group: props.max_txs_per_group,
            next_block,
            channel,
        })
    }

    /// Spawns the attempt, delivering its outcome on the result channel.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let channel = self.channel.clone();
            let result = self.mine().await;
            if let Err(e) = &result {
                warn!(error = %e, code = e.code(), "mining attempt did not produce a block");
            }
            if channel.send(result).await.is_err() {
                warn!("mining result dropped: channel closed");
            }
        })
    }

    /// Runs the full pipeline to completion.
    pub async fn mine(mut self) -> MinerResult {
        let groups = group_by_image(std::mem::take(&mut self.pending), self.max_txs_per_group);
        info!(
            groups = groups.len(),
            async_groups = self.async_groups,
            "mining attempt started"
        );

        if self.async_groups {
            self.build_groups_parallel(groups).await?;
        } else {
            self.build_groups_sequential(groups).await?;
        }

        self.generate_merkle();
        self.search_pow().await
    }

    async fn build_groups_sequential(
        &self,
        groups: BTreeMap<String, Vec<Transaction>>,
    ) -> Result<(), MinerError> {
        for (image_hash, txs) in groups {
            if self.inner.cancel.is_cancelled() {
                return Err(MinerError::Canceled);
            }
            match self.inner.build_next_states(&image_hash, txs).await {
                Ok(()) => {}
                Err(MinerError::Canceled) => return Err(MinerError::Canceled),
                // A failing group is dropped from this attempt only; its
                // transactions stay pending for the next one.
                Err(e) => {
                    warn!(image = %image_hash, error = %e, code = e.code(), "skipping image group")
                }
            }
        }
        Ok(())
    }

    async fn build_groups_parallel(
        &self,
        groups: BTreeMap<String, Vec<Transaction>>,
    ) -> Result<(), MinerError> {
        let mut handles = Vec::with_capacity(groups.len());
        for (image_hash, txs) in groups {
            let inner = self.inner.clone();
            handles.push(tokio::spawn(async move {
                if inner.cancel.is_cancelled() {
                    return Err(MinerError::Canceled);
                }
                match inner.build_next_states(&image_hash, txs).await {
                    Ok(()) => Ok(()),
                    Err(MinerError::Canceled) => Err(MinerError::Canceled),
                    Err(e) => {
                        warn!(image = %image_hash, error = %e, code = e.code(), "skipping image group");
                        Ok(())
                    }
                }
            }));
        }

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(MinerError::Canceled)) => return Err(MinerError::Canceled),
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(MinerError::Internal(format!(
                        "image group task panicked: {e}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn generate_merkle(&mut self) {
        let hashes = self.inner.bundle.sorted_statechain_hashes();
        info!(leaves = hashes.len(), "generating merkle commitment");
        let tree = merkle::build_from_hashes(&hashes, STATECHAIN_BLOCKS_KIND);
        self.next_block.state_blocks_merkle_hash = tree.root.clone();
        self.inner.bundle.insert_tree(tree);
    }

    async fn search_pow(mut self) -> MinerResult {
        let difficulty = self.inner.difficulty;
        info!(difficulty, "searching for proof of work");
        let mut nonce = [0u8; 32];
        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(MinerError::Canceled);
            }

            rand::rngs::OsRng.fill_bytes(&mut nonce);
            self.next_block.nonce = hexutil::encode_bytes(&nonce);
            let hash = self.next_block.calc_hash()?;
            if check_hash_against_difficulty(&hash, difficulty)? {
                debug!(hash = %hash, "difficulty target met");
                self.next_block.block_hash = Some(hash);
                let mined = self
                    .inner
                    .bundle
                    .freeze(self.next_block, self.inner.previous_block.clone());
                info!(number = %mined.next_block.block_number, "mainchain block mined");
                return Ok(mined);
            }

            tokio::task::yield_now().await;
        }
    }
}

impl Inner {
    /// Phase B for one image group: reconstruct current state, execute the
    /// group's transactions, and commit the resulting blocks and diffs as
    /// one batch.
    async fn build_next_states(
        &self,
        image_hash: &str,
        mut txs: Vec<Transaction>,
    ) -> Result<(), MinerError> {
        debug!(image = %image_hash, txs = txs.len(), "building next states");

        let head = match &self.previous_block {
            Some(prev) => {
                self.store
                    .fetch_most_recent_state_block(image_hash, prev, &self.cancel)
                    .await?
            }
            None => None,
        };

        let mut committed_txs: Vec<Transaction> = Vec::new();
        let mut new_diffs: Vec<Diff> = Vec::new();
        let mut new_blocks: Vec<StatechainBlock> = Vec::new();

        let (prev_state_block, replay_diffs) = match head {
            Some(block) => {
                let diffs = self.gather_diffs(&block).await?;
                debug!(image = %image_hash, diffs = diffs.len(), "gathered statechain diffs");
                (block, diffs)
            }
            None => {
                // No statechain exists for this image, so the group's first
                // transaction becomes its genesis.
                if txs.is_empty() {
                    return Err(MinerError::Internal("empty image group".to_string()));
                }
                let genesis_tx = txs.remove(0);
                debug!(image = %image_hash, "image has no statechain; building genesis block");
                let (genesis_block, genesis_diff) =
                    self.build_genesis_state_block(image_hash, &genesis_tx)?;
                committed_txs.push(genesis_tx);
                new_blocks.push(genesis_block.clone());
                new_diffs.push(genesis_diff.clone());
                (genesis_block, vec![genesis_diff])
            }
        };

        // Materialize current state in a group-private scratch directory;
        // the directory and everything in it vanish on any exit path.
        let scratch = tempfile::Builder::new()
            .prefix("caravel-miner-")
            .tempdir()
            .map_err(io_err)?;
        let state_path = scratch.path().join(STATE_FILE);
        let next_path = scratch.path().join(NEXT_STATE_FILE);
        let patch_path = scratch.path().join(PATCH_FILE);

        tokio::fs::write(&state_path, b"").await.map_err(io_err)?;
        for diff in &replay_diffs {
            if self.cancel.is_cancelled() {
                return Err(MinerError::Canceled);
            }
            tokio::fs::write(&patch_path, &diff.data)
                .await
                .map_err(io_err)?;
            self.engine.patch(&patch_path, false, true).await?;
        }
        let mut current_state = tokio::fs::read(&state_path).await.map_err(io_err)?;

        let mut running_number = prev_state_block.block_number_u64()?;
        let mut running_hash = prev_state_block.hash()?;

        for tx in txs {
            if self.cancel.is_cancelled() {
                return Err(MinerError::Canceled);
            }
            let tx_hash = tx
                .tx_hash
                .clone()
                .ok_or_else(|| MinerError::Internal("selected transaction has no hash".into()))?;

            let next_state = if tx.method == INVOKE_METHOD {
                let call = tx.parse_invoke_payload()?;
                let payload = codec::to_canonical_json(&call)?;
                debug!(image = %image_hash, method = %call.method, "invoking container method");
                self.sandbox
                    .play(&PlayConfig {
                        image_id: tx.image_hash.clone(),
                        payload,
                        initial_state: current_state.clone(),
                    })
                    .await?
            } else {
                // Unrecognized methods still advance the chain, with an
                // empty next state.
                Vec::new()
            };

            tokio::fs::write(&next_path, &next_state)
                .await
                .map_err(io_err)?;
            self.engine.diff(&state_path, &next_path, &patch_path).await?;
            let patch_text = tokio::fs::read_to_string(&patch_path)
                .await
                .map_err(io_err)?;
            let mut diff = Diff::new(patch_text);
            diff.set_hash()?;

            tokio::fs::rename(&next_path, &state_path)
                .await
                .map_err(io_err)?;

            running_number += 1;
            let mut block = StatechainBlock {
                block_number: hexutil::encode_u64(running_number),
                block_time: hexutil::encode_u64(self.block_time),
                image_hash: image_hash.to_string(),
                tx_hash,
                prev_block_hash: running_hash.clone(),
                state_prev_diff_hash: diff.hash()?,
                state_current_hash: hashing::hash_to_hex_string(&next_state),
                block_hash: None,
            };
            block.set_hash()?;
            running_hash = block.hash()?;

            current_state = next_state;
            new_diffs.push(diff);
            new_blocks.push(block);
            committed_txs.push(tx);
        }

        let count = new_blocks.len();
        self.bundle
            .commit_group(new_blocks, committed_txs, new_diffs)?;
        info!(image = %image_hash, blocks = count, "image group committed");
        Ok(())
    }

    /// Walks from `head` back to the image's genesis block, returning every
    /// transition diff in chronological order.
    async fn gather_diffs(&self, head: &StatechainBlock) -> Result<Vec<Diff>, MinerError> {
        let mut diffs: VecDeque<Diff> = VecDeque::new();

        let head_diff_cid = cid_by_hash(&head.state_prev_diff_hash)?;
        diffs.push_front(self.store.get_diff(&head_diff_cid, &self.cancel).await?);

        let mut walker = head.clone();
        while !walker.is_genesis() {
            if self.cancel.is_cancelled() {
                return Err(MinerError::Canceled);
            }

            let prev_cid = cid_by_hash(&walker.prev_block_hash)?;
            let prev = self
                .store
                .get_statechain_block(&prev_cid, &self.cancel)
                .await?;
            let diff_cid = cid_by_hash(&prev.state_prev_diff_hash)?;
            diffs.push_front(self.store.get_diff(&diff_cid, &self.cancel).await?);
            walker = prev;
        }

        Ok(diffs.into())
    }

    /// Builds the synthetic height-0 statechain block for an image's first
    /// transaction: empty state, and a degenerate empty diff for the
    /// empty-to-empty transition.
    fn build_genesis_state_block(
        &self,
        image_hash: &str,
        tx: &Transaction,
    ) -> Result<(StatechainBlock, Diff), MinerError> {
        let tx_hash = tx
            .tx_hash
            .clone()
            .ok_or_else(|| MinerError::Internal("genesis transaction has no hash".into()))?;

        let mut diff = Diff::new(String::new());
        diff.set_hash()?;

        let mut block = StatechainBlock {
            block_number: hexutil::encode_u64(0),
            block_time: hexutil::encode_u64(self.block_time),
            image_hash: image_hash.to_string(),
            tx_hash,
            prev_block_hash: GENESIS_PREV_BLOCK_HASH.to_string(),
            state_prev_diff_hash: diff.hash()?,
            state_current_hash: hashing::hash_to_hex_string(b""),
            block_hash: None,
        };
        block.set_hash()?;
        Ok((block, diff))
    }
}

/// Phase A: partition pending transactions by image, preserving submission
/// order inside each group.
fn group_by_image(
    txs: Vec<Transaction>,
    max_per_group: usize,
) -> BTreeMap<String, Vec<Transaction>> {
    let mut groups: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    let mut dropped = 0usize;
    for tx in txs {
        let group = groups.entry(tx.image_hash.clone()).or_default();
        if group.len() >= max_per_group {
            dropped += 1;
            continue;
        }
        group.push(tx);
    }
    if dropped > 0 {
        warn!(dropped, "transactions over the per-image cap stay pending");
    }
    groups
}

/// Builds the successor of `previous_block` (or a height-0 block) with a
/// placeholder commitment and nonce.
fn bootstrap_next_block(props: &MinerProps, block_time: u64) -> Result<MainchainBlock, MinerError> {
    let (block_number, prev_block_hash) = match &props.previous_block {
        Some(prev) => {
            let hash = prev
                .block_hash
                .clone()
                .ok_or_else(|| MinerError::Internal("previous block's hash is not bound".into()))?;
            (prev.block_number_u64()? + 1, hash)
        }
        None => (0, String::new()),
    };

    Ok(MainchainBlock {
        block_number: hexutil::encode_u64(block_number),
        block_time: hexutil::encode_u64(block_time),
        image_hash: MAINCHAIN_IMAGE_HASH.to_string(),
        state_blocks_merkle_hash: EMPTY_MERKLE_ROOT.to_string(),
        prev_block_hash,
        nonce: hexutil::encode_bytes(&[0u8; 32]),
        difficulty: hexutil::encode_u64(props.difficulty),
        miner_address: props.encoded_miner_address.clone(),
        block_hash: None,
    })
}

fn io_err(e: std::io::Error) -> MinerError {
    MinerError::Diff(DiffError::Io(e))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(image: &str, note: &str) -> Transaction {
        let mut tx = Transaction::new(image, INVOKE_METHOD, json!(["op", note]), "someone");
        tx.set_hash().unwrap();
        tx
    }

    #[test]
    fn grouping_preserves_submission_order_per_image() {
        let txs = vec![
            tx(&"a".repeat(64), "1"),
            tx(&"b".repeat(64), "2"),
            tx(&"a".repeat(64), "3"),
        ];
        let expected = vec![txs[0].clone(), txs[2].clone()];
        let groups = group_by_image(txs, DEFAULT_MAX_TXS_PER_GROUP);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&"a".repeat(64)], expected);
    }

    #[test]
    fn grouping_caps_each_image() {
        let image = "c".repeat(64);
        let txs: Vec<_> = (0..5).map(|i| tx(&image, &i.to_string())).collect();
        let groups = group_by_image(txs, 3);
        assert_eq!(groups[&image].len(), 3);
    }

    #[test]
    fn bootstrap_extends_the_previous_block() {
        let prev = caravel_types::mainchain::genesis_block().unwrap();
        let props = MinerProps {
            previous_block: Some(prev.clone()),
            difficulty: 2,
            encoded_miner_address: "miner".to_string(),
            pending_transactions: Vec::new(),
            async_groups: false,
            max_txs_per_group: DEFAULT_MAX_TXS_PER_GROUP,
            block_time: Some(42),
        };
        let next = bootstrap_next_block(&props, 42).unwrap();
        assert_eq!(next.block_number_u64().unwrap(), 1);
        assert_eq!(next.prev_block_hash, prev.block_hash.unwrap());
        assert_eq!(next.difficulty_u64().unwrap(), 2);
        assert_eq!(next.image_hash, MAINCHAIN_IMAGE_HASH);
    }

    #[test]
    fn bootstrap_requires_a_bound_parent_hash() {
        let mut prev = caravel_types::mainchain::genesis_block().unwrap();
        prev.block_hash = None;
        let props = MinerProps {
            previous_block: Some(prev),
            difficulty: 1,
            encoded_miner_address: String::new(),
            pending_transactions: Vec::new(),
            async_groups: false,
            max_txs_per_group: DEFAULT_MAX_TXS_PER_GROUP,
            block_time: None,
        };
        assert!(matches!(
            bootstrap_next_block(&props, 0),
            Err(MinerError::Internal(_))
        ));
    }
}
