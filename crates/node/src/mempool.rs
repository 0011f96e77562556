//! The mempool: pending transactions and the current chain head.

use async_trait::async_trait;
use caravel_types::error::MempoolError;
use caravel_types::{MainchainBlock, Transaction};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Storage for transactions awaiting mining, plus the node's view of the
/// current mainchain head.
#[async_trait]
pub trait Mempool: Send + Sync {
    /// Adds a transaction; duplicates (by hash) are ignored.
    async fn add_transaction(&self, tx: Transaction) -> Result<(), MempoolError>;

    /// Returns pending transactions in submission order.
    async fn pending_transactions(&self) -> Result<Vec<Transaction>, MempoolError>;

    /// Removes mined transactions by hash.
    async fn remove_transactions(&self, hashes: &[String]) -> Result<(), MempoolError>;

    /// Returns the current head block, if one has been set.
    async fn head_block(&self) -> Result<Option<MainchainBlock>, MempoolError>;

    /// Replaces the current head block.
    async fn set_head_block(&self, block: MainchainBlock) -> Result<(), MempoolError>;
}

#[derive(Debug, Default)]
struct PoolInner {
    pending: Vec<Transaction>,
    seen: HashSet<String>,
    head: Option<MainchainBlock>,
}

/// The in-memory [`Mempool`].
///
/// Submission order is preserved; the miner relies on it as the per-image
/// execution order.
#[derive(Debug, Default)]
pub struct SafeMempool {
    inner: RwLock<PoolInner>,
}

impl SafeMempool {
    /// Creates an empty mempool.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Mempool for SafeMempool {
    async fn add_transaction(&self, tx: Transaction) -> Result<(), MempoolError> {
        let hash = tx
            .tx_hash
            .clone()
            .ok_or(MempoolError::UnhashedTransaction)?;
        let mut inner = self.inner.write().await;
        if inner.seen.insert(hash) {
            inner.pending.push(tx);
        }
        Ok(())
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, MempoolError> {
        Ok(self.inner.read().await.pending.clone())
    }

    async fn remove_transactions(&self, hashes: &[String]) -> Result<(), MempoolError> {
        let mut inner = self.inner.write().await;
        for hash in hashes {
            inner.seen.remove(hash);
        }
        inner
            .pending
            .retain(|tx| !matches!(&tx.tx_hash, Some(h) if hashes.contains(h)));
        Ok(())
    }

    async fn head_block(&self) -> Result<Option<MainchainBlock>, MempoolError> {
        Ok(self.inner.read().await.head.clone())
    }

    async fn set_head_block(&self, block: MainchainBlock) -> Result<(), MempoolError> {
        self.inner.write().await.head = Some(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_types::INVOKE_METHOD;
    use serde_json::json;

    fn tx(image: &str, arg: &str) -> Transaction {
        let mut tx = Transaction::new(image, INVOKE_METHOD, json!(["set", arg]), "sender");
        tx.set_hash().unwrap();
        tx
    }

    #[tokio::test]
    async fn preserves_submission_order_and_dedupes() {
        let pool = SafeMempool::new();
        let a = tx(&"1".repeat(64), "a");
        let b = tx(&"2".repeat(64), "b");
        pool.add_transaction(a.clone()).await.unwrap();
        pool.add_transaction(b.clone()).await.unwrap();
        pool.add_transaction(a.clone()).await.unwrap();

        let pending = pool.pending_transactions().await.unwrap();
        assert_eq!(pending, vec![a, b]);
    }

    #[tokio::test]
    async fn rejects_unhashed_transactions() {
        let pool = SafeMempool::new();
        let raw = Transaction::new(&"1".repeat(64), INVOKE_METHOD, json!(["x"]), "sender");
        assert!(matches!(
            pool.add_transaction(raw).await,
            Err(MempoolError::UnhashedTransaction)
        ));
    }

    #[tokio::test]
    async fn removes_mined_transactions() {
        let pool = SafeMempool::new();
        let a = tx(&"1".repeat(64), "a");
        let b = tx(&"1".repeat(64), "b");
        pool.add_transaction(a.clone()).await.unwrap();
        pool.add_transaction(b.clone()).await.unwrap();

        pool.remove_transactions(&[a.tx_hash.clone().unwrap()])
            .await
            .unwrap();
        assert_eq!(pool.pending_transactions().await.unwrap(), vec![b]);

        // A removed hash may be resubmitted.
        pool.add_transaction(a.clone()).await.unwrap();
        assert_eq!(pool.pending_transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tracks_the_head_block() {
        let pool = SafeMempool::new();
        assert!(pool.head_block().await.unwrap().is_none());
        let genesis = caravel_types::mainchain::genesis_block().unwrap();
        pool.set_head_block(genesis.clone()).await.unwrap();
        assert_eq!(pool.head_block().await.unwrap(), Some(genesis));
    }
}
