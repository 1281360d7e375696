//! Retention pruning, dangling-version pruning, and the empty-directory
//! sweep that follows both.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{error, info, warn};

use crate::catalog_store;
use crate::clock;
use crate::error::PruneError;
use crate::scanner::{self, ScanOptions};

/// How stale an on-disk version or product must be (by mtime) before
/// dangling prune will remove it, to avoid racing an in-progress upload.
pub const DANGLING_GRACE: Duration = Duration::from_secs(6 * 60 * 60);

/// Parameters for a prune run.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Repository root.
    pub root: PathBuf,
    /// Metadata-format version, e.g. `v1`.
    pub stream_version: String,
    /// Stream names to prune.
    pub streams: Vec<String>,
    /// Number of newest versions to retain per product. `None` skips
    /// retention pruning.
    pub retain: Option<usize>,
    /// Whether to run dangling-version pruning.
    pub dangling: bool,
}

/// Retention prune: keeps the `retain` lexicographically-largest version
/// names per product, publishes the reduced catalog, then removes the
/// dropped versions' directories. Directory removal failures are logged but
/// non-fatal.
pub async fn retention_prune(config: &PruneConfig, retain: usize) -> Result<(), PruneError> {
    for stream in &config.streams {
        let mut catalog =
            catalog_store::read_catalog(&config.root, &config.stream_version, stream).await?;
        let stream_root = crate::path::stream_dir(&config.root, stream);
        let mut to_remove: Vec<PathBuf> = Vec::new();

        for product in catalog.products.values_mut() {
            let mut names: Vec<String> = product.versions.keys().cloned().collect();
            names.sort();
            names.reverse();
            for dropped in names.into_iter().skip(retain) {
                product.versions.remove(&dropped);
                to_remove.push(stream_root.join(product.identity.rel_path()).join(&dropped));
            }
        }

        let mut catalogs = std::collections::BTreeMap::new();
        catalogs.insert(stream.clone(), catalog);
        catalog_store::publish(&config.root, &config.stream_version, &catalogs, &clock::now_rfc3339())
            .await?;

        for dir in to_remove {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                warn!(stream, path = %dir.display(), error = %e, "failed to remove pruned version directory");
            } else {
                info!(stream, path = %dir.display(), "removed pruned version directory");
            }
        }
    }
    Ok(())
}

fn mtime_older_than(metadata: &std::fs::Metadata, grace: Duration) -> bool {
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age >= grace,
        Err(_) => false,
    }
}

/// Dangling prune: for each stream, removes on-disk products and versions
/// not referenced by the catalog and older than [`DANGLING_GRACE`]. Skips a
/// stream entirely if its catalog has zero products, to avoid wiping the
/// tree after an accidental catalog loss.
pub async fn dangling_prune(config: &PruneConfig) -> Result<(), PruneError> {
    for stream in &config.streams {
        let catalog =
            catalog_store::read_catalog(&config.root, &config.stream_version, stream).await?;
        if catalog.products.is_empty() {
            warn!(stream, "catalog has zero products, skipping dangling prune");
            continue;
        }

        let stream_root = crate::path::stream_dir(&config.root, stream);
        let on_disk = scanner::get_products(
            &stream_root,
            &ScanOptions {
                calc_hashes: false,
                allow_incomplete: true,
            },
        )
        .await?;

        for (id, disk_product) in &on_disk {
            match catalog.products.get(id) {
                None => {
                    let dir = stream_root.join(disk_product.identity.rel_path());
                    if let Ok(metadata) = fs::metadata(&dir).await {
                        if mtime_older_than(&metadata, DANGLING_GRACE) {
                            if let Err(e) = fs::remove_dir_all(&dir).await {
                                error!(stream, path = %dir.display(), error = %e, "failed to remove dangling product");
                            } else {
                                info!(stream, path = %dir.display(), "removed dangling product");
                            }
                        }
                    }
                }
                Some(cataloged_product) => {
                    for version_name in disk_product.versions.keys() {
                        if cataloged_product.versions.contains_key(version_name) {
                            continue;
                        }
                        let dir = stream_root
                            .join(disk_product.identity.rel_path())
                            .join(version_name);
                        if let Ok(metadata) = fs::metadata(&dir).await {
                            if mtime_older_than(&metadata, DANGLING_GRACE) {
                                if let Err(e) = fs::remove_dir_all(&dir).await {
                                    error!(stream, path = %dir.display(), error = %e, "failed to remove dangling version");
                                } else {
                                    info!(stream, path = %dir.display(), "removed dangling version");
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Recursively removes empty directories under `root`. `keep_root` prevents
/// removing `root` itself even if it ends up empty.
pub async fn sweep_empty_dirs(root: &Path, keep_root: bool) -> Result<(), PruneError> {
    Box::pin(sweep_inner(root, keep_root)).await?;
    Ok(())
}

async fn sweep_inner(dir: &Path, keep: bool) -> Result<bool, PruneError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(source) => {
            return Err(PruneError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut is_empty = true;
    while let Some(entry) = entries.next_entry().await.map_err(|source| PruneError::Io {
        path: dir.to_path_buf(),
        source,
    })? {
        let file_type = entry.file_type().await.map_err(|source| PruneError::Io {
            path: entry.path(),
            source,
        })?;
        if file_type.is_dir() {
            let child_empty = Box::pin(sweep_inner(&entry.path(), false)).await?;
            if !child_empty {
                is_empty = false;
            }
        } else {
            is_empty = false;
        }
    }

    if is_empty && !keep {
        fs::remove_dir(dir).await.map_err(|source| PruneError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn sweep_removes_empty_leaf_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).await.unwrap();
        sweep_empty_dirs(dir.path(), true).await.unwrap();
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn sweep_preserves_non_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).await.unwrap();
        fs::write(nested.join("file.txt"), b"x").await.unwrap();
        sweep_empty_dirs(dir.path(), true).await.unwrap();
        assert!(dir.path().join("a/b/file.txt").exists());
    }

    #[tokio::test]
    async fn scenario_e_retention_prune_keeps_largest_n_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let stream_root = root.join("images");
        for v in ["2024_01_01", "2024_01_05", "2024_05_01", "2025_01_01"] {
            let version_dir = stream_root.join("ubuntu/focal/amd64/cloud").join(v);
            fs::create_dir_all(&version_dir).await.unwrap();
            fs::write(version_dir.join("lxd.tar.xz"), b"m").await.unwrap();
            fs::write(version_dir.join("rootfs.squashfs"), b"r").await.unwrap();
        }
        let config = PruneConfig {
            root: root.clone(),
            stream_version: "v1".to_string(),
            streams: vec!["images".to_string()],
            retain: Some(3),
            dangling: false,
        };
        let products = scanner::get_products(&stream_root, &ScanOptions::default()).await.unwrap();
        let mut catalog = crate::model::Catalog::empty("images");
        catalog.products = products;
        let mut catalogs = BTreeMap::new();
        catalogs.insert("images".to_string(), catalog);
        catalog_store::publish(&root, "v1", &catalogs, "2024-01-01T00:00:00Z").await.unwrap();

        retention_prune(&config, 3).await.unwrap();

        let pruned = catalog_store::read_catalog(&root, "v1", "images").await.unwrap();
        let product = pruned.products.get("ubuntu:focal:amd64:cloud").unwrap();
        let mut kept: Vec<&String> = product.versions.keys().collect();
        kept.sort();
        assert_eq!(
            kept,
            vec!["2024_01_05", "2024_05_01", "2025_01_01"]
        );
        assert!(!stream_root.join("ubuntu/focal/amd64/cloud/2024_01_01").exists());
    }

    #[tokio::test]
    async fn scenario_f_dangling_prune_guard_on_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let stream_root = root.join("images");
        let version_dir = stream_root.join("ubuntu/focal/amd64/cloud/20240101_0000");
        fs::create_dir_all(&version_dir).await.unwrap();
        fs::write(version_dir.join("lxd.tar.xz"), b"m").await.unwrap();

        let config = PruneConfig {
            root: root.clone(),
            stream_version: "v1".to_string(),
            streams: vec!["images".to_string()],
            retain: None,
            dangling: true,
        };
        dangling_prune(&config).await.unwrap();
        assert!(version_dir.exists());
    }
}
