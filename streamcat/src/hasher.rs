//! SHA-256 hashing: single files and "combined" hashes over an ordered
//! concatenation of files.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::HashError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams each of `paths`, in order, into a single SHA-256 accumulator and
/// returns the lowercase hex digest.
///
/// This is the only place a "combined" hash is computed: callers pass
/// `[metadata_path, item_path]` to get the combined hash of a (metadata,
/// rootfs) pair, rather than hashing each file separately and hashing the
/// digests together.
///
/// An empty `paths` returns the empty string.
pub async fn file_hash(paths: &[&Path]) -> Result<String, HashError> {
    if paths.is_empty() {
        return Ok(String::new());
    }
    let mut hasher = Sha256::new();
    for path in paths {
        let mut file = File::open(path).await.map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|source| HashError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the SHA-256 of a single file.
pub async fn single_file_hash(path: &Path) -> Result<String, HashError> {
    file_hash(&[path]).await
}

/// Returns `Ok(true)` iff `path`'s SHA-256 equals `expected_hex`
/// (case-insensitively).
pub async fn verify_checksum(path: &Path, expected_hex: &str) -> Result<bool, HashError> {
    let actual = single_file_hash(path).await?;
    Ok(actual.eq_ignore_ascii_case(expected_hex))
}
