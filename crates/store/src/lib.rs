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

//! # Caravel Store
//!
//! The content-addressed object store the mining pipeline reads chain
//! history from and writes mined entities into. The store is logically a
//! DAG: a block never references its own descendants, so walking
//! `prev_block_hash` links always terminates.
//!
//! The network-backed store lives outside this workspace; [`MemoryStore`]
//! implements the same trait for tests and single-node operation. The only
//! bridge between the hashes stored inside block fields and store keys is
//! the [`cidutil`] module.

use async_trait::async_trait;
use caravel_types::error::StoreError;
use caravel_types::{Diff, MainchainBlock, StatechainBlock, Transaction};
use cid::Cid;
use tokio_util::sync::CancellationToken;

/// The hash to CID codec.
pub mod cidutil;
/// The in-memory store backend.
pub mod memory;

pub use cidutil::{cid_by_hash, hash_by_cid};
pub use memory::MemoryStore;

/// A content-addressed store over the four chain entities.
///
/// Put operations key the entity by its canonical hash and return the CID it
/// can be fetched under. Get operations may block on the network, so they
/// take a cancellation token and must return [`StoreError::Canceled`]
/// promptly once it fires.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Stores a mainchain block, returning its CID.
    async fn put_mainchain_block(&self, block: &MainchainBlock) -> Result<Cid, StoreError>;

    /// Stores a statechain block, returning its CID.
    async fn put_statechain_block(&self, block: &StatechainBlock) -> Result<Cid, StoreError>;

    /// Stores a transaction, returning its CID.
    async fn put_transaction(&self, tx: &Transaction) -> Result<Cid, StoreError>;

    /// Stores a diff, returning its CID.
    async fn put_diff(&self, diff: &Diff) -> Result<Cid, StoreError>;

    /// Fetches a mainchain block by CID.
    async fn get_mainchain_block(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<MainchainBlock, StoreError>;

    /// Fetches a statechain block by CID.
    async fn get_statechain_block(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<StatechainBlock, StoreError>;

    /// Fetches a transaction by CID.
    async fn get_transaction(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<Transaction, StoreError>;

    /// Fetches a diff by CID.
    async fn get_diff(&self, cid: &Cid, cancel: &CancellationToken) -> Result<Diff, StoreError>;

    /// Returns the most recent statechain block for `image_hash` as anchored
    /// by the main chain ending at `head_main_block`, or `None` when the
    /// image has no statechain yet.
    async fn fetch_most_recent_state_block(
        &self,
        image_hash: &str,
        head_main_block: &MainchainBlock,
        cancel: &CancellationToken,
    ) -> Result<Option<StatechainBlock>, StoreError>;
}
