//! The subprocess diff engine over GNU `diff(1)` and `patch(1)`.
//!
//! Commands run with the patch file's directory as working directory and
//! with paths relativized against it, so the emitted patches carry bare
//! file names and stay applicable from any later scratch directory.

use crate::DiffEngine;
use async_trait::async_trait;
use caravel_types::error::DiffError;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// The diff engine backed by the system `diff` and `patch` tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellEngine;

impl ShellEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        Self
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn relativize<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

fn subprocess_error(output: &Output) -> DiffError {
    DiffError::Subprocess {
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

#[async_trait]
impl DiffEngine for ShellEngine {
    async fn diff(
        &self,
        old_path: &Path,
        new_path: &Path,
        patch_path: &Path,
    ) -> Result<(), DiffError> {
        let dir = parent_dir(patch_path);
        let output = Command::new("diff")
            .arg("-u")
            .arg(relativize(old_path, dir))
            .arg(relativize(new_path, dir))
            .current_dir(dir)
            .output()
            .await?;

        // diff exits 1 when the inputs differ; only >1 is trouble.
        match output.status.code() {
            Some(0) | Some(1) => {
                tokio::fs::write(patch_path, &output.stdout).await?;
                Ok(())
            }
            _ => Err(subprocess_error(&output)),
        }
    }

    async fn patch(
        &self,
        patch_path: &Path,
        reverse: bool,
        in_place: bool,
    ) -> Result<(), DiffError> {
        if tokio::fs::metadata(patch_path).await?.len() == 0 {
            // An empty patch is the identity.
            return Ok(());
        }

        let dir = parent_dir(patch_path);
        let patch_name = relativize(patch_path, dir);
        let mut cmd = Command::new("patch");
        cmd.arg("-p0")
            .arg("-s")
            .arg("-f")
            .arg("-i")
            .arg(patch_name)
            .current_dir(dir);
        if reverse {
            cmd.arg("-R");
        }
        if !in_place {
            cmd.arg("-o").arg(format!("{}.out", patch_name.display()));
        }

        debug!(patch = %patch_path.display(), reverse, in_place, "applying patch");
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(subprocess_error(&output));
        }
        Ok(())
    }

    async fn combine(
        &self,
        acc_patch_path: &Path,
        new_patch_path: &Path,
        out_patch_path: &Path,
    ) -> Result<(), DiffError> {
        crate::concat_patches(acc_patch_path, new_patch_path, out_patch_path).await
    }
}
