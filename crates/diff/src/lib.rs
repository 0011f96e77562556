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

//! # Caravel Diff
//!
//! The textual diff engine behind statechain transitions. State snapshots
//! are diffed into line-oriented unified patches; replaying a statechain
//! applies those patches in order to the image's genesis state.
//!
//! The engine is a trait so the subprocess-backed [`ShellEngine`] (GNU
//! `diff(1)`/`patch(1)`) can be swapped for the dependency-free
//! [`TextEngine`] in tests and on hosts without the shell tools. Both
//! produce unified-format patches, but not byte-identical ones, so a
//! network must settle on a single engine.

use async_trait::async_trait;
use caravel_types::error::DiffError;
use std::path::Path;

/// The subprocess engine over GNU `diff(1)` and `patch(1)`.
pub mod shell;
/// The pure in-process engine.
pub mod text;

pub use shell::ShellEngine;
pub use text::TextEngine;

/// A line-oriented patch engine over files on disk.
///
/// Contracts: applying `diff(a, b)` to `a` yields `b` byte-for-byte; an
/// empty patch is the identity; `combine` is associative up to equivalence
/// of effect.
#[async_trait]
pub trait DiffEngine: Send + Sync {
    /// Writes to `patch_path` a textual patch that turns `old_path` into
    /// `new_path`.
    ///
    /// When the three paths share a directory the patch records bare file
    /// names, which keeps it applicable from any later scratch directory.
    async fn diff(
        &self,
        old_path: &Path,
        new_path: &Path,
        patch_path: &Path,
    ) -> Result<(), DiffError>;

    /// Applies the patch at `patch_path` to the file named inside it,
    /// resolved relative to the patch's directory.
    ///
    /// With `reverse` the patch is un-applied. With `in_place` false the
    /// target file is left untouched and the result is written next to the
    /// patch as `<patch_path>.out`.
    async fn patch(
        &self,
        patch_path: &Path,
        reverse: bool,
        in_place: bool,
    ) -> Result<(), DiffError>;

    /// Folds the patches at `acc_patch_path` and `new_patch_path` into one
    /// patch at `out_patch_path` equivalent to applying both in sequence.
    async fn combine(
        &self,
        acc_patch_path: &Path,
        new_patch_path: &Path,
        out_patch_path: &Path,
    ) -> Result<(), DiffError>;
}

/// Concatenates two patch files.
///
/// Patches apply their sections in order, so concatenation is the fold both
/// engines use for `combine`; a missing trailing newline on the first patch
/// is repaired so the second patch's headers start on a fresh line.
pub(crate) async fn concat_patches(
    acc_patch_path: &Path,
    new_patch_path: &Path,
    out_patch_path: &Path,
) -> Result<(), DiffError> {
    let mut acc = tokio::fs::read(acc_patch_path).await?;
    let next = tokio::fs::read(new_patch_path).await?;
    if !acc.is_empty() && !acc.ends_with(b"\n") {
        acc.push(b'\n');
    }
    acc.extend_from_slice(&next);
    tokio::fs::write(out_patch_path, acc).await?;
    Ok(())
}
