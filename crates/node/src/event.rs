//! The node's subscriber events.

use caravel_miner::MinedBlock;
use caravel_types::Transaction;

/// A message on the node's subscriber channel.
///
/// The closed set of things a node reacts to: a failure somewhere in the
/// pipeline, a freshly mined bundle, or an inbound transaction.
#[derive(Debug)]
pub enum NodeEvent {
    /// A pipeline or network error to surface in the logs.
    Error(String),
    /// A mined bundle, produced locally or received from a peer.
    MinedBlock(Box<MinedBlock>),
    /// A transaction to add to the mempool.
    Transaction(Box<Transaction>),
}
