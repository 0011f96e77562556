//! The node service.
//!
//! Routes subscriber events and supervises mining: on every new head the
//! previous attempt is canceled and a fresh miner is spawned over the
//! current mempool snapshot. At most one miner is active per head.

use crate::config::NodeConfig;
use crate::event::NodeEvent;
use crate::mempool::Mempool;
use caravel_diff::DiffEngine;
use caravel_miner::{MinedBlock, Miner, MinerProps, MinerResult};
use caravel_sandbox::Sandbox;
use caravel_store::BlockStore;
use caravel_types::error::{MinerError, StoreError};
use caravel_types::{mainchain, MainchainBlock, Transaction};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Construction inputs for a [`Node`].
pub struct NodeProps {
    /// Runtime configuration.
    pub config: NodeConfig,
    /// The mempool backing this node.
    pub mempool: Arc<dyn Mempool>,
    /// The object store chain entities are persisted into.
    pub store: Arc<dyn BlockStore>,
    /// The sandbox miners execute transactions in.
    pub sandbox: Arc<dyn Sandbox>,
    /// The diff engine miners build state transitions with.
    pub engine: Arc<dyn DiffEngine>,
}

/// The running node.
pub struct Node {
    config: NodeConfig,
    mempool: Arc<dyn Mempool>,
    store: Arc<dyn BlockStore>,
    sandbox: Arc<dyn Sandbox>,
    engine: Arc<dyn DiffEngine>,
    events_tx: mpsc::Sender<NodeEvent>,
    events_rx: mpsc::Receiver<NodeEvent>,
    shutdown: CancellationToken,
    miner_cancel: Mutex<Option<CancellationToken>>,
}

impl Node {
    /// Builds a node around its collaborators.
    pub fn new(props: NodeProps) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: props.config,
            mempool: props.mempool,
            store: props.store,
            sandbox: props.sandbox,
            engine: props.engine,
            events_tx,
            events_rx,
            shutdown: CancellationToken::new(),
            miner_cancel: Mutex::new(None),
        }
    }

    /// Returns a sender for depositing events onto the subscriber channel.
    pub fn event_sender(&self) -> mpsc::Sender<NodeEvent> {
        self.events_tx.clone()
    }

    /// Returns the token that stops the node and its miners when canceled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the node: spawns the first miner on the current head and then
    /// dispatches subscriber events until shutdown.
    pub async fn run(mut self) -> Result<(), anyhow::Error> {
        let head = match self.mempool.head_block().await? {
            Some(head) => head,
            None => {
                let genesis = mainchain::genesis_block()?;
                self.mempool.set_head_block(genesis.clone()).await?;
                genesis
            }
        };
        info!(number = %head.block_number, "node started");
        self.spawn_miner(head).await?;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Some(miner) = self.miner_cancel.lock().await.take() {
                        miner.cancel();
                    }
                    info!("node shutting down");
                    return Ok(());
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::Error(message) => error!(%message, "received error event"),
            NodeEvent::Transaction(tx) => self.handle_transaction(*tx).await,
            NodeEvent::MinedBlock(mined) => self.handle_mined_block(*mined).await,
        }
    }

    async fn handle_transaction(&self, tx: Transaction) {
        debug!("received transaction");
        if let Err(e) = self.mempool.add_transaction(tx).await {
            warn!(error = %e, "dropping inbound transaction");
        }
    }

    async fn handle_mined_block(&self, mined: MinedBlock) {
        debug!("received mined block");
        if self.config.verify_received_blocks {
            match mainchain::verify_block(&mined.next_block) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("dropping mined block that failed verification");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "dropping unverifiable mined block");
                    return;
                }
            }
        }

        if let Err(e) = self.persist_mined_block(&mined).await {
            error!(error = %e, "failed to persist mined block");
            return;
        }

        let head = mined.next_block.clone();
        info!(
            number = %head.block_number,
            statechain_blocks = mined.statechain_blocks.len(),
            "new head block"
        );
        if let Err(e) = self.mempool.set_head_block(head.clone()).await {
            error!(error = %e, "failed to advance mempool head");
            return;
        }

        let mined_hashes: Vec<String> = mined.transactions.keys().cloned().collect();
        if let Err(e) = self.mempool.remove_transactions(&mined_hashes).await {
            warn!(error = %e, "failed to prune mined transactions");
        }

        if let Err(e) = self.spawn_miner(head).await {
            error!(error = %e, "failed to spawn the next miner");
        }
    }

    async fn persist_mined_block(&self, mined: &MinedBlock) -> Result<(), StoreError> {
        self.store.put_mainchain_block(&mined.next_block).await?;
        for block in mined.statechain_blocks.values() {
            self.store.put_statechain_block(block).await?;
        }
        for tx in mined.transactions.values() {
            self.store.put_transaction(tx).await?;
        }
        for diff in mined.diffs.values() {
            self.store.put_diff(diff).await?;
        }
        Ok(())
    }

    /// Spawns a mining attempt anchored at `head`, canceling any previous
    /// attempt, and forwards its outcome onto the subscriber channel.
    pub async fn spawn_miner(&self, head: MainchainBlock) -> Result<(), MinerError> {
        let cancel = self.shutdown.child_token();
        if let Some(previous) = self.miner_cancel.lock().await.replace(cancel.clone()) {
            previous.cancel();
        }

        let pending = self
            .mempool
            .pending_transactions()
            .await
            .map_err(|e| MinerError::Internal(e.to_string()))?;
        let props = MinerProps {
            previous_block: Some(head),
            difficulty: self.config.difficulty,
            encoded_miner_address: self.config.miner_address.clone(),
            pending_transactions: pending,
            async_groups: self.config.async_groups,
            max_txs_per_group: self.config.max_txs_per_group,
            block_time: None,
        };

        let (results_tx, mut results_rx) = mpsc::channel::<MinerResult>(1);
        let miner = Miner::new(
            props,
            self.store.clone(),
            self.sandbox.clone(),
            self.engine.clone(),
            cancel,
            results_tx,
        )?;
        miner.spawn();

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match results_rx.recv().await {
                Some(Ok(mined)) => {
                    if events
                        .send(NodeEvent::MinedBlock(Box::new(mined)))
                        .await
                        .is_err()
                    {
                        debug!("mined block dropped: node stopped");
                    }
                }
                Some(Err(MinerError::Canceled)) => debug!("mining attempt canceled"),
                Some(Err(e)) => {
                    let _ = events.send(NodeEvent::Error(e.to_string())).await;
                }
                None => {}
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::SafeMempool;
    use async_trait::async_trait;
    use caravel_diff::TextEngine;
    use caravel_sandbox::PlayConfig;
    use caravel_store::{cid_by_hash, MemoryStore};
    use caravel_types::error::SandboxError;
    use caravel_types::INVOKE_METHOD;
    use serde_json::json;
    use std::time::Duration;

    /// A sandbox that appends each invocation to the state as one line.
    struct AppendSandbox;

    #[async_trait]
    impl Sandbox for AppendSandbox {
        async fn play(&self, config: &PlayConfig) -> Result<Vec<u8>, SandboxError> {
            let mut state = config.initial_state.clone();
            state.extend_from_slice(&config.payload);
            state.push(b'\n');
            Ok(state)
        }
    }

    fn test_node() -> (Node, Arc<SafeMempool>, Arc<MemoryStore>) {
        let mempool = Arc::new(SafeMempool::new());
        let store = Arc::new(MemoryStore::new());
        let node = Node::new(NodeProps {
            config: NodeConfig {
                difficulty: 1,
                async_groups: true,
                ..NodeConfig::default()
            },
            mempool: mempool.clone(),
            store: store.clone(),
            sandbox: Arc::new(AppendSandbox),
            engine: Arc::new(TextEngine::new()),
        });
        (node, mempool, store)
    }

    #[tokio::test]
    async fn routes_transactions_into_the_mempool() {
        let (node, mempool, _store) = test_node();
        let mut tx = Transaction::new(&"1".repeat(64), INVOKE_METHOD, json!(["init"]), "sender");
        tx.set_hash().unwrap();

        node.handle_event(NodeEvent::Transaction(Box::new(tx.clone())))
            .await;
        assert_eq!(mempool.pending_transactions().await.unwrap(), vec![tx]);
    }

    #[tokio::test]
    async fn logs_error_events_without_side_effects() {
        let (node, mempool, _store) = test_node();
        node.handle_event(NodeEvent::Error("boom".to_string())).await;
        assert!(mempool.pending_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mines_submitted_transactions_and_advances_the_head() {
        let (node, mempool, store) = test_node();
        let events = node.event_sender();
        let shutdown = node.shutdown_token();
        let runner = tokio::spawn(node.run());

        let mut tx = Transaction::new(&"2".repeat(64), INVOKE_METHOD, json!(["init"]), "sender");
        tx.set_hash().unwrap();
        let tx_cid = cid_by_hash(&tx.tx_hash.clone().unwrap()).unwrap();
        events
            .send(NodeEvent::Transaction(Box::new(tx.clone())))
            .await
            .unwrap();

        // Wait until the transaction has been mined and persisted.
        let cancel = CancellationToken::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let mined = store.get_transaction(&tx_cid, &cancel).await.is_ok();
            let pruned = mempool.pending_transactions().await.unwrap().is_empty();
            if mined && pruned {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "transaction was not mined in time"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let head = mempool.head_block().await.unwrap().unwrap();
        assert!(head.block_number_u64().unwrap() >= 1);

        shutdown.cancel();
        runner.await.unwrap().unwrap();
    }
}
