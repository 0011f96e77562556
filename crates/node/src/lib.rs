#![forbid(unsafe_code)]

//! # Caravel Node
//!
//! The harness around the mining pipeline: it owns the mempool, routes
//! inbound events (transactions, mined blocks, errors), persists mined
//! bundles into the object store, and keeps exactly one miner running
//! against the current head. Miners deposit results and exit; the harness
//! never blocks them.

/// Node configuration, loadable from a TOML file.
pub mod config;
/// The tagged event union delivered on the node's subscriber channel.
pub mod event;
/// The mempool trait and its in-memory implementation.
pub mod mempool;
/// The node service itself.
pub mod service;

pub use config::NodeConfig;
pub use event::NodeEvent;
pub use mempool::{Mempool, SafeMempool};
pub use service::{Node, NodeProps};
