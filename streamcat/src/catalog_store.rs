//! Reads and atomically publishes the JSON product catalog and stream index.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs;

use crate::error::PublishError;
use crate::model::{Catalog, Index, IndexEntry};
use crate::path;

fn io_err(path: &Path, source: std::io::Error) -> PublishError {
    PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads `stream`'s catalog, returning an empty one (`content_id = stream`)
/// if the file does not exist. Any other read or parse error surfaces.
pub async fn read_catalog(root: &Path, stream_version: &str, stream: &str) -> Result<Catalog, PublishError> {
    let path = path::catalog_path(root, stream_version, stream);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Catalog::empty(stream)),
        Err(e) => return Err(io_err(&path, e)),
    };
    let mut catalog: Catalog = serde_json::from_slice(&bytes)?;
    for (id, product) in catalog.products.iter_mut() {
        if let Some(identity) = crate::path::parse_product_id(id) {
            product.identity = identity;
        }
    }
    Ok(catalog)
}

/// Reads the stream-version's index, returning an empty one if absent.
pub async fn read_index(root: &Path, stream_version: &str) -> Result<Index, PublishError> {
    let path = path::index_path(root, stream_version);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::empty()),
        Err(e) => return Err(io_err(&path, e)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

fn gzip_best(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// A file staged for atomic publish: its final path, temp path, and bytes.
struct StagedFile {
    final_path: PathBuf,
    temp_path: PathBuf,
    bytes: Vec<u8>,
}

fn temp_sibling(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("out");
    final_path.with_file_name(format!(".{file_name}.tmp"))
}

async fn write_staged(staged: &StagedFile) -> Result<(), PublishError> {
    fs::write(&staged.temp_path, &staged.bytes)
        .await
        .map_err(|source| io_err(&staged.temp_path, source))
}

async fn rename_into_place(staged: &StagedFile) -> Result<(), PublishError> {
    fs::rename(&staged.temp_path, &staged.final_path)
        .await
        .map_err(|source| io_err(&staged.final_path, source))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o644);
        fs::set_permissions(&staged.final_path, perms)
            .await
            .map_err(|source| io_err(&staged.final_path, source))?;
    }
    Ok(())
}

async fn cleanup<'a>(staged: impl IntoIterator<Item = &'a StagedFile>) {
    for file in staged {
        let _ = fs::remove_file(&file.temp_path).await;
    }
}

/// Atomically publishes a batch of per-stream catalogs and the index.
///
/// Writes every catalog and its `.gz` sibling to `.`-prefixed `.tmp` temp
/// paths, then the index and its `.gz` sibling the same way. Only after
/// every temp file is written does it rename into place, in the order
/// `[catalogs, catalog .gz, index, index .gz]` — the index is renamed last
/// so a concurrent reader never sees it reference a catalog that isn't on
/// disk yet.
pub async fn publish(
    root: &Path,
    stream_version: &str,
    catalogs: &BTreeMap<String, Catalog>,
    updated: &str,
) -> Result<(), PublishError> {
    let metadata_dir = path::metadata_dir(root, stream_version);
    fs::create_dir_all(&metadata_dir)
        .await
        .map_err(|source| io_err(&metadata_dir, source))?;

    let mut catalog_files = Vec::new();
    let mut catalog_gz_files = Vec::new();
    let mut index = read_index(root, stream_version).await.unwrap_or_else(|_| Index::empty());

    for (stream, catalog) in catalogs {
        let json_path = path::catalog_path(root, stream_version, stream);
        let bytes = serde_json::to_vec_pretty(catalog)?;
        let gz_bytes = gzip_best(&bytes).map_err(|source| io_err(&json_path, source))?;
        let gz_path = path::catalog_gz_path(root, stream_version, stream);

        catalog_files.push(StagedFile {
            temp_path: temp_sibling(&json_path),
            final_path: json_path.clone(),
            bytes,
        });
        catalog_gz_files.push(StagedFile {
            temp_path: temp_sibling(&gz_path),
            final_path: gz_path,
            bytes: gz_bytes,
        });

        let rel_path = path::catalog_path(Path::new(""), stream_version, stream);
        let entry: IndexEntry = Index::entry_for(stream, rel_path.to_string_lossy().into_owned(), updated.to_string(), catalog);
        index.set(stream, entry);
    }

    for staged in catalog_files.iter().chain(catalog_gz_files.iter()) {
        if let Err(e) = write_staged(staged).await {
            cleanup(&catalog_files).await;
            cleanup(&catalog_gz_files).await;
            return Err(e);
        }
    }

    let index_path = path::index_path(root, stream_version);
    let index_bytes = serde_json::to_vec_pretty(&index)?;
    let index_gz_bytes = gzip_best(&index_bytes).map_err(|source| io_err(&index_path, source))?;
    let index_gz_path = path::index_gz_path(root, stream_version);
    let index_staged = StagedFile {
        temp_path: temp_sibling(&index_path),
        final_path: index_path,
        bytes: index_bytes,
    };
    let index_gz_staged = StagedFile {
        temp_path: temp_sibling(&index_gz_path),
        final_path: index_gz_path,
        bytes: index_gz_bytes,
    };
    if let Err(e) = write_staged(&index_staged).await {
        cleanup(&catalog_files).await;
        cleanup(&catalog_gz_files).await;
        return Err(e);
    }
    if let Err(e) = write_staged(&index_gz_staged).await {
        cleanup(&catalog_files).await;
        cleanup(&catalog_gz_files).await;
        cleanup(std::slice::from_ref(&index_staged)).await;
        return Err(e);
    }

    let all_staged: Vec<&StagedFile> = catalog_files
        .iter()
        .chain(catalog_gz_files.iter())
        .chain(std::iter::once(&index_staged))
        .chain(std::iter::once(&index_gz_staged))
        .collect();

    for (i, staged) in all_staged.iter().enumerate() {
        if let Err(e) = rename_into_place(staged).await {
            cleanup(all_staged[i..].iter().copied()).await;
            return Err(e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_catalog_returns_empty_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = read_catalog(dir.path(), "v1", "images").await.unwrap();
        assert_eq!(catalog.content_id, "images");
        assert!(catalog.products.is_empty());
    }

    #[tokio::test]
    async fn publish_writes_catalog_and_index_with_gz_companions() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalogs = BTreeMap::new();
        catalogs.insert("images".to_string(), Catalog::empty("images"));
        publish(dir.path(), "v1", &catalogs, "2024-01-01T00:00:00Z")
            .await
            .unwrap();

        assert!(path::catalog_path(dir.path(), "v1", "images").exists());
        assert!(path::catalog_gz_path(dir.path(), "v1", "images").exists());
        assert!(path::index_path(dir.path(), "v1").exists());
        assert!(path::index_gz_path(dir.path(), "v1").exists());

        let index = read_index(dir.path(), "v1").await.unwrap();
        assert!(index.index.contains_key("images"));
    }

    #[tokio::test]
    async fn publish_leaves_no_temp_files_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalogs = BTreeMap::new();
        catalogs.insert("images".to_string(), Catalog::empty("images"));
        publish(dir.path(), "v1", &catalogs, "2024-01-01T00:00:00Z")
            .await
            .unwrap();

        let metadata_dir = path::metadata_dir(dir.path(), "v1");
        let mut entries = std::fs::read_dir(&metadata_dir).unwrap();
        assert!(!entries.any(|e| e.unwrap().file_name().to_string_lossy().ends_with(".tmp")));
    }

    #[tokio::test]
    async fn repeated_scan_with_no_changes_is_byte_equal() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalogs = BTreeMap::new();
        catalogs.insert("images".to_string(), Catalog::empty("images"));
        publish(dir.path(), "v1", &catalogs, "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        let first = fs::read(path::catalog_path(dir.path(), "v1", "images")).await.unwrap();
        publish(dir.path(), "v1", &catalogs, "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        let second = fs::read(path::catalog_path(dir.path(), "v1", "images")).await.unwrap();
        assert_eq!(first, second);
    }
}
