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

//! # Caravel Telemetry
//!
//! Observability infrastructure for Caravel nodes. Today this is structured
//! logging only: a single initialization routine that installs a global
//! `tracing` subscriber with JSON output and environment-driven filtering.

/// The initialization routine for global structured logging.
pub mod init;

pub use init::init_tracing;
