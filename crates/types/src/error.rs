//! Core error types for Caravel.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while serializing, hashing, or verifying entities.
#[derive(Error, Debug)]
pub enum EntityError {
    /// Canonical JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// A hex-framed field could not be decoded.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
    /// A hash field was required but not bound on the entity.
    #[error("no hash present")]
    MissingHash,
    /// A bound hash did not match the recomputed canonical hash.
    #[error("hash mismatch. Expected {expected}, got {got}")]
    HashMismatch {
        /// The recomputed canonical hash.
        expected: String,
        /// The hash bound on the entity.
        got: String,
    },
    /// A transaction payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// A `from` address could not be decoded into a public key.
    #[error("from address is not valid: {0}")]
    InvalidAddress(String),
    /// A signature was required but not present on the transaction.
    #[error("no signature present")]
    MissingSignature,
    /// A signature failed verification against the bound hash.
    #[error("signature verification failed")]
    InvalidSignature,
}

impl ErrorCode for EntityError {
    fn code(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "ENTITY_SERIALIZATION_FAILED",
            Self::InvalidHex(_) => "ENTITY_INVALID_HEX",
            Self::MissingHash => "ENTITY_MISSING_HASH",
            Self::HashMismatch { .. } => "ENTITY_HASH_MISMATCH",
            Self::InvalidPayload(_) => "ENTITY_INVALID_PAYLOAD",
            Self::InvalidAddress(_) => "ENTITY_INVALID_ADDRESS",
            Self::MissingSignature => "ENTITY_MISSING_SIGNATURE",
            Self::InvalidSignature => "ENTITY_INVALID_SIGNATURE",
        }
    }
}

/// Errors raised by the diff engine.
#[derive(Error, Debug)]
pub enum DiffError {
    /// A scratch file could not be created, read, or written.
    #[error("diff scratch io error: {0}")]
    Io(#[from] std::io::Error),
    /// A `diff(1)`/`patch(1)` subprocess exited abnormally.
    #[error("diff subprocess failed with status {status}: {stderr}")]
    Subprocess {
        /// The subprocess exit status, or -1 if terminated by signal.
        status: i32,
        /// Captured standard error output.
        stderr: String,
    },
    /// A patch could not be parsed or applied to the target text.
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
    /// A state snapshot was not valid UTF-8 text.
    #[error("state is not utf-8 text: {0}")]
    NonTextual(String),
}

impl ErrorCode for DiffError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "DIFF_IO_ERROR",
            Self::Subprocess { .. } => "DIFF_SUBPROCESS_FAILED",
            Self::MalformedPatch(_) => "DIFF_MALFORMED_PATCH",
            Self::NonTextual(_) => "DIFF_NON_TEXTUAL_STATE",
        }
    }
}

/// Errors raised by the content-addressed object store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object exists under the requested CID.
    #[error("object not found for cid {0}")]
    NotFound(String),
    /// A CID or hash key could not be decoded.
    #[error("invalid cid: {0}")]
    InvalidCid(String),
    /// A stored object failed to decode into the requested entity.
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// The fetch was canceled before the object arrived.
    #[error("store operation canceled")]
    Canceled,
    /// The underlying backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "STORE_NOT_FOUND",
            Self::InvalidCid(_) => "STORE_INVALID_CID",
            Self::Entity(_) => "STORE_MALFORMED_ENTITY",
            Self::Canceled => "STORE_CANCELED",
            Self::Backend(_) => "STORE_BACKEND_ERROR",
        }
    }
}

/// Errors raised by the container sandbox.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The container runtime could not be reached or rejected the request.
    #[error("sandbox runtime error: {0}")]
    Runtime(String),
    /// The container did not finish within the configured bound.
    #[error("sandbox timed out after {0}s")]
    Timeout(u64),
    /// The container exited with a non-zero status.
    #[error("sandbox exited with status {0}")]
    NonZeroExit(i64),
    /// The container finished but its output state could not be read.
    #[error("sandbox produced malformed output: {0}")]
    MalformedOutput(String),
    /// Staging the input state or payload for the container failed.
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for SandboxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "SANDBOX_RUNTIME_ERROR",
            Self::Timeout(_) => "SANDBOX_TIMEOUT",
            Self::NonZeroExit(_) => "SANDBOX_NON_ZERO_EXIT",
            Self::MalformedOutput(_) => "SANDBOX_MALFORMED_OUTPUT",
            Self::Io(_) => "SANDBOX_IO_ERROR",
        }
    }
}

/// Errors raised by the mempool.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// A transaction without a bound hash was submitted.
    #[error("transaction has no hash")]
    UnhashedTransaction,
    /// The mempool backend failed.
    #[error("mempool backend error: {0}")]
    Backend(String),
}

impl ErrorCode for MempoolError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnhashedTransaction => "MEMPOOL_UNHASHED_TRANSACTION",
            Self::Backend(_) => "MEMPOOL_BACKEND_ERROR",
        }
    }
}

/// Errors raised by the mining pipeline.
///
/// Group-level failures (`MissingDependency`, `MalformedEntity`, `Sandbox`,
/// `Diff`) abort only the image group that raised them; `Canceled` and
/// `Internal` terminate the whole run.
#[derive(Error, Debug)]
pub enum MinerError {
    /// The mining context was canceled.
    #[error("mining canceled")]
    Canceled,
    /// A referenced block or diff could not be fetched from the store.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    /// An entity failed serialization or hash verification.
    #[error(transparent)]
    MalformedEntity(#[from] EntityError),
    /// A container execution failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    /// A diff or patch operation failed.
    #[error(transparent)]
    Diff(#[from] DiffError),
    /// An invariant the pipeline established earlier no longer holds.
    #[error("internal miner error: {0}")]
    Internal(String),
}

impl ErrorCode for MinerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Canceled => "MINER_CANCELED",
            Self::MissingDependency(_) => "MINER_MISSING_DEPENDENCY",
            Self::MalformedEntity(_) => "MINER_MALFORMED_ENTITY",
            Self::Sandbox(_) => "MINER_SANDBOX_FAILURE",
            Self::Diff(_) => "MINER_DIFF_FAILURE",
            Self::Internal(_) => "MINER_INTERNAL",
        }
    }
}

impl From<StoreError> for MinerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(cid) => Self::MissingDependency(cid),
            StoreError::Canceled => Self::Canceled,
            StoreError::Entity(inner) => Self::MalformedEntity(inner),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_miner_error_kinds() {
        let e: MinerError = StoreError::NotFound("bafy".into()).into();
        assert!(matches!(e, MinerError::MissingDependency(_)));

        let e: MinerError = StoreError::Canceled.into();
        assert!(matches!(e, MinerError::Canceled));

        let e: MinerError = StoreError::Entity(EntityError::MissingHash).into();
        assert_eq!(e.code(), "MINER_MALFORMED_ENTITY");
    }
}
