#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Caravel Types
//!
//! This crate is the foundational library for Caravel, containing the four
//! chain entities (`Transaction`, `Diff`, `StatechainBlock`,
//! `MainchainBlock`), the canonical JSON codec they are hashed over, and the
//! error types shared across the workspace.
//!
//! ## Architectural Role
//!
//! As the base crate, `caravel-types` has minimal dependencies and is itself
//! a dependency for almost every other crate in the workspace. Every hash in
//! the system is SHA-256 over the canonical serialization produced here, so
//! centralizing the codec prevents two components from ever disagreeing on
//! an entity's identity.

/// The canonical JSON codec and hex string framing for entities.
pub mod codec;
/// The textual diff entity carrying one state transition.
pub mod diff;
/// A unified set of all error types used across the workspace.
pub mod error;
/// SHA-256 hashing helpers and the hex digest form used for entity hashes.
pub mod hashing;
/// `0x`-prefixed hex encoding of integers and byte strings.
pub mod hexutil;
/// The mainchain block entity and its proof-of-work fields.
pub mod mainchain;
/// The per-image statechain block entity.
pub mod statechain;
/// The signed transaction entity and its payload parsing.
pub mod transaction;

pub use diff::Diff;
pub use mainchain::{MainchainBlock, MAINCHAIN_IMAGE_HASH};
pub use statechain::{StatechainBlock, GENESIS_PREV_BLOCK_HASH};
pub use transaction::{Transaction, TxSig, INVOKE_METHOD};
