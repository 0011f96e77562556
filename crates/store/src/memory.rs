//! An in-memory store backend.
//!
//! Stand-in for the network-backed store in tests and single-node runs.
//! Objects live in one map keyed by CID, holding the same hex-framed
//! canonical JSON the wire store would carry, so gets exercise the full
//! decode path. A side index tracks each image's highest statechain block
//! to answer head queries.

use crate::cidutil::cid_by_hash;
use crate::BlockStore;
use async_trait::async_trait;
use caravel_types::error::StoreError;
use caravel_types::{codec, Diff, MainchainBlock, StatechainBlock, Transaction};
use cid::Cid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// The in-memory [`BlockStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, String>>,
    /// image hash -> highest statechain block stored for it.
    state_heads: RwLock<HashMap<String, StatechainBlock>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn put_object<T: Serialize>(&self, hash: &str, entity: &T) -> Result<Cid, StoreError> {
        let cid = cid_by_hash(hash)?;
        let framed = codec::serialize_string(entity)?;
        self.objects.write().await.insert(cid.to_string(), framed);
        Ok(cid)
    }

    async fn get_object<T: DeserializeOwned>(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<T, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        let objects = self.objects.read().await;
        let framed = objects
            .get(&cid.to_string())
            .ok_or_else(|| StoreError::NotFound(cid.to_string()))?;
        Ok(codec::deserialize_string(framed)?)
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn put_mainchain_block(&self, block: &MainchainBlock) -> Result<Cid, StoreError> {
        self.put_object(&block.hash()?, block).await
    }

    async fn put_statechain_block(&self, block: &StatechainBlock) -> Result<Cid, StoreError> {
        let cid = self.put_object(&block.hash()?, block).await?;

        let number = block.block_number_u64()?;
        let mut heads = self.state_heads.write().await;
        let stale = heads
            .get(&block.image_hash)
            .map(|head| head.block_number_u64().unwrap_or(0) < number)
            .unwrap_or(true);
        if stale {
            heads.insert(block.image_hash.clone(), block.clone());
        }
        Ok(cid)
    }

    async fn put_transaction(&self, tx: &Transaction) -> Result<Cid, StoreError> {
        self.put_object(&tx.hash()?, tx).await
    }

    async fn put_diff(&self, diff: &Diff) -> Result<Cid, StoreError> {
        self.put_object(&diff.hash()?, diff).await
    }

    async fn get_mainchain_block(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<MainchainBlock, StoreError> {
        self.get_object(cid, cancel).await
    }

    async fn get_statechain_block(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<StatechainBlock, StoreError> {
        self.get_object(cid, cancel).await
    }

    async fn get_transaction(
        &self,
        cid: &Cid,
        cancel: &CancellationToken,
    ) -> Result<Transaction, StoreError> {
        self.get_object(cid, cancel).await
    }

    async fn get_diff(&self, cid: &Cid, cancel: &CancellationToken) -> Result<Diff, StoreError> {
        self.get_object(cid, cancel).await
    }

    async fn fetch_most_recent_state_block(
        &self,
        image_hash: &str,
        _head_main_block: &MainchainBlock,
        cancel: &CancellationToken,
    ) -> Result<Option<StatechainBlock>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        Ok(self.state_heads.read().await.get(image_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_types::{hexutil, mainchain, transaction, INVOKE_METHOD};
    use serde_json::json;

    fn state_block(image: &str, number: u64) -> StatechainBlock {
        let mut block = StatechainBlock {
            block_number: hexutil::encode_u64(number),
            block_time: hexutil::encode_u64(1_700_000_000),
            image_hash: image.to_string(),
            tx_hash: "2".repeat(64),
            prev_block_hash: "3".repeat(64),
            state_prev_diff_hash: "4".repeat(64),
            state_current_hash: "5".repeat(64),
            block_hash: None,
        };
        block.set_hash().unwrap();
        block
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();

        let tx = transaction::Transaction::new(
            &"a".repeat(64),
            INVOKE_METHOD,
            json!(["init"]),
            "nobody",
        );
        let cid = store.put_transaction(&tx).await.unwrap();
        let fetched = store.get_transaction(&cid, &cancel).await.unwrap();
        assert_eq!(fetched, tx);

        let block = state_block(&"a".repeat(64), 1);
        let cid = store.put_statechain_block(&block).await.unwrap();
        assert_eq!(store.get_statechain_block(&cid, &cancel).await.unwrap(), block);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let cid = cid_by_hash(&caravel_types::hashing::hash_to_hex_string(b"nothing")).unwrap();
        assert!(matches!(
            store.get_diff(&cid, &cancel).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn canceled_get_short_circuits() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cid = cid_by_hash(&"0".repeat(64)).unwrap();
        assert!(matches!(
            store.get_transaction(&cid, &cancel).await,
            Err(StoreError::Canceled)
        ));
    }

    #[tokio::test]
    async fn state_head_tracks_highest_block() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let head_main = mainchain::genesis_block().unwrap();
        let image = "a".repeat(64);

        assert!(store
            .fetch_most_recent_state_block(&image, &head_main, &cancel)
            .await
            .unwrap()
            .is_none());

        store
            .put_statechain_block(&state_block(&image, 0))
            .await
            .unwrap();
        store
            .put_statechain_block(&state_block(&image, 2))
            .await
            .unwrap();
        store
            .put_statechain_block(&state_block(&image, 1))
            .await
            .unwrap();

        let head = store
            .fetch_most_recent_state_block(&image, &head_main, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.block_number_u64().unwrap(), 2);
    }
}
