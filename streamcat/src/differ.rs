//! Invokes the external `xdelta3`-compatible binary to produce a binary
//! delta between two versions of the same artifact.

use std::path::Path;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::DiffError;

/// Name of the external delta generator binary. Treated as a black box: its
/// wire format is whatever the tool produces.
pub const DIFFER_BIN: &str = "xdelta3";

/// Runs `xdelta3 -e -9 -s <source> <target> <output>`, racing it against
/// `cancel`. On any failure (non-zero exit, spawn error, or cancellation)
/// removes a partial `output` file, if one was created.
pub async fn diff(
    source: &Path,
    target: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<(), DiffError> {
    if !source.exists() {
        return Err(DiffError::SourceMissing(source.to_path_buf()));
    }

    let spawned = Command::new(DIFFER_BIN)
        .arg("-e")
        .arg("-9")
        .arg("-s")
        .arg(source)
        .arg(target)
        .arg(output)
        .kill_on_drop(true)
        .spawn();

    let result = match spawned {
        Err(e) => Err(DiffError::Spawn(e)),
        Ok(mut child) => {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if status.success() => Ok(()),
                        Ok(status) => Err(DiffError::ExitStatus(status)),
                        Err(e) => Err(DiffError::Spawn(e)),
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    Err(DiffError::Cancelled)
                }
            }
        }
    };

    if result.is_err() {
        remove_partial_output(output).await?;
    }

    result
}

async fn remove_partial_output(output: &Path) -> Result<(), DiffError> {
    match tokio::fs::remove_file(output).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DiffError::Cleanup {
            path: output.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_source_fails_fast_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("missing-source");
        let target = dir.path().join("target");
        let output = dir.path().join("output.vcdiff");
        tokio::fs::write(&target, b"data").await.unwrap();
        let cancel = CancellationToken::new();
        let result = diff(&source, &target, &output, &cancel).await;
        assert!(matches!(result, Err(DiffError::SourceMissing(_))));
    }

    #[tokio::test]
    async fn cancellation_before_spawn_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        let output = dir.path().join("output.vcdiff");
        tokio::fs::write(&source, b"data").await.unwrap();
        tokio::fs::write(&target, b"data").await.unwrap();
        tokio::fs::write(&output, b"partial").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        // The differ binary itself may not be installed in the test
        // environment; a spawn failure is an acceptable outcome here too,
        // as long as partial output is still removed.
        let _ = diff(&source, &target, &output, &cancel).await;
        assert!(!output.exists());
    }
}
