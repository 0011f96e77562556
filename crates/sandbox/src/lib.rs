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

//! # Caravel Sandbox
//!
//! Deterministic container execution. The miner hands the sandbox an image
//! id, a JSON payload, and the image's current state bytes; the container
//! computes and returns the next state bytes. Given identical inputs the
//! sandbox must yield byte-identical output on every honest node, which is
//! what lets independently mined statechain blocks agree.
//!
//! ## I/O contract
//!
//! A scratch directory is bind-mounted into the container at
//! [`CONTAINER_MOUNT`]. The initial state is staged there as
//! [`STATE_FILE`] and the payload as [`PAYLOAD_FILE`]; the container reads
//! both and overwrites the state file with its final state before exiting
//! zero. A non-zero exit or a timeout fails the run, as does output the
//! host cannot read back.

use async_trait::async_trait;
use caravel_types::error::SandboxError;

/// The Docker-backed sandbox runtime.
pub mod docker;

pub use docker::DockerSandbox;

/// The bind-mount point inside the container.
pub const CONTAINER_MOUNT: &str = "/caravel";

/// The state file name inside the mount: input state on entry, next state
/// on exit.
pub const STATE_FILE: &str = "state.json";

/// The payload file name inside the mount.
pub const PAYLOAD_FILE: &str = "payload.json";

/// One container execution request.
#[derive(Debug, Clone)]
pub struct PlayConfig {
    /// The container image to run, addressed by its content hash.
    pub image_id: String,
    /// The JSON invocation payload delivered to the container.
    pub payload: Vec<u8>,
    /// The state bytes the container starts from.
    pub initial_state: Vec<u8>,
}

/// A sandboxed, resource-bounded container runtime.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs the image against the initial state and payload, returning the
    /// next state bytes.
    async fn play(&self, config: &PlayConfig) -> Result<Vec<u8>, SandboxError>;
}
