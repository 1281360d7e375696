//! The two-phase build pipeline: incorporate new/changed versions into each
//! stream's catalog, generate deltas against the updated catalog, then
//! publish.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog_store;
use crate::differ;
use crate::error::BuildError;
use crate::hasher;
use crate::model::{ftype, Catalog, Product};
use crate::pool::WorkerPool;
use crate::scanner::{self, ScanOptions};

/// Parameters for a single build run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Repository root.
    pub root: PathBuf,
    /// Metadata-format version, e.g. `v1`.
    pub stream_version: String,
    /// Stream names to (re)build, e.g. `["images", "images-daily"]`.
    pub streams: Vec<String>,
    /// Worker pool size. Defaults to [`WorkerPool::default_worker_count`].
    pub workers: usize,
}

/// Splits `(existing, fresh)` products into `removed` (catalogued but no
/// longer on disk) and `added`: new products in full, or existing products
/// reduced to just their new versions, with product-level metadata taken
/// from `fresh`.
fn diff_products(
    existing: &BTreeMap<String, Product>,
    fresh: &BTreeMap<String, Product>,
) -> (Vec<String>, BTreeMap<String, Product>) {
    let removed: Vec<String> = existing
        .keys()
        .filter(|id| !fresh.contains_key(*id))
        .cloned()
        .collect();

    let mut added = BTreeMap::new();
    for (id, fresh_product) in fresh {
        match existing.get(id) {
            None => {
                added.insert(id.clone(), fresh_product.clone());
            }
            Some(existing_product) => {
                let mut new_versions = BTreeMap::new();
                for (version_name, version) in &fresh_product.versions {
                    if !existing_product.versions.contains_key(version_name) {
                        new_versions.insert(version_name.clone(), version.clone());
                    }
                }
                if !new_versions.is_empty() {
                    let mut product = fresh_product.clone();
                    product.versions = new_versions;
                    added.insert(id.clone(), product);
                }
            }
        }
    }
    (removed, added)
}

async fn incorporate_added(
    stream: &str,
    stream_root: Arc<PathBuf>,
    catalog: Arc<Mutex<Catalog>>,
    added: BTreeMap<String, Product>,
    pool: &mut WorkerPool,
) {
    for (id, added_product) in added {
        let identity = added_product.identity.clone();
        let new_version_names: Vec<String> = added_product.versions.keys().cloned().collect();

        {
            let mut guard = catalog.lock().await;
            let existing_versions = guard
                .products
                .get(&id)
                .map(|p| p.versions.clone())
                .unwrap_or_default();
            let mut merged = added_product;
            merged.versions = existing_versions;
            guard.products.insert(id.clone(), merged);
        }

        for version_name in new_version_names {
            let stream = stream.to_string();
            let id = id.clone();
            let identity = identity.clone();
            let stream_root = stream_root.clone();
            let catalog = catalog.clone();
            pool.submit(async move {
                let version_rel_path = identity.rel_path().join(&version_name);
                let opts = ScanOptions {
                    calc_hashes: true,
                    allow_incomplete: false,
                };
                match scanner::get_version(&stream_root, &version_rel_path, &opts).await {
                    Ok(version) => {
                        if let Some(checksums) = &version.checksums {
                            for (name, item) in &version.items {
                                if let (Some(expected), Some(actual)) =
                                    (checksums.get(name), &item.sha256)
                                {
                                    if !actual.eq_ignore_ascii_case(expected) {
                                        warn!(
                                            stream,
                                            product = %id,
                                            version = %version_name,
                                            item = %name,
                                            "checksum mismatch, excluding version from catalog"
                                        );
                                        return;
                                    }
                                }
                            }
                        }
                        let mut guard = catalog.lock().await;
                        if let Some(product) = guard.products.get_mut(&id) {
                            product.versions.insert(version_name.clone(), version);
                        }
                    }
                    Err(e) => {
                        error!(stream, product = %id, version = %version_name, error = %e, "failed to scan new version");
                    }
                }
            })
            .await;
        }
    }
}

fn strip_extension<'a>(name: &'a str, ftype: &str) -> Option<(&'a str, &'static str)> {
    match ftype {
        self::ftype::SQUASHFS => name.strip_suffix(".squashfs").map(|p| (p, "vcdiff")),
        self::ftype::DISK_KVM_IMG => name.strip_suffix(".qcow2").map(|p| (p, "qcow2.vcdiff")),
        _ => None,
    }
}

async fn generate_deltas(
    stream: &str,
    stream_root: Arc<PathBuf>,
    catalog: Arc<Mutex<Catalog>>,
    cancel: CancellationToken,
    pool: &mut WorkerPool,
) {
    let snapshot = { catalog.lock().await.clone() };

    for (id, product) in &snapshot.products {
        let version_names: Vec<String> = product.versions.keys().cloned().collect();
        if version_names.len() < 2 {
            continue;
        }
        for i in 1..version_names.len() {
            let prev_name = version_names[i - 1].clone();
            let cur_name = version_names[i].clone();
            let prev_version = &product.versions[&prev_name];
            let cur_version = &product.versions[&cur_name];

            for (name, item) in &cur_version.items {
                let Some((prefix, suffix)) = strip_extension(name, &item.ftype) else {
                    continue;
                };
                let delta_filename = format!("{prefix}.{prev_name}.{suffix}");
                let delta_existed_before = cur_version.items.contains_key(&delta_filename);
                let source_exists = prev_version.items.contains_key(name);
                let has_checksums = cur_version
                    .checksums
                    .as_ref()
                    .map(|c| !c.is_empty())
                    .unwrap_or(false);

                let stream = stream.to_string();
                let id = id.clone();
                let identity = product.identity.clone();
                let source_name = name.clone();
                let cur_name = cur_name.clone();
                let prev_name = prev_name.clone();
                let stream_root = stream_root.clone();
                let catalog = catalog.clone();
                let cancel = cancel.clone();

                pool.submit(async move {
                    let product_rel = identity.rel_path();
                    let source_path = stream_root.join(&product_rel).join(&prev_name).join(&source_name);
                    let target_path = stream_root.join(&product_rel).join(&cur_name).join(&source_name);
                    let output_path = stream_root.join(&product_rel).join(&cur_name).join(&delta_filename);
                    let output_rel = product_rel.join(&cur_name).join(&delta_filename);

                    if !delta_existed_before {
                        if !source_exists {
                            return;
                        }
                        if let Err(e) = differ::diff(&source_path, &target_path, &output_path, &cancel).await {
                            error!(stream, product = %id, version = %cur_name, item = %delta_filename, error = %e, "delta generation failed");
                            return;
                        }
                    }

                    let lacks_hash = {
                        let guard = catalog.lock().await;
                        guard
                            .products
                            .get(&id)
                            .and_then(|p| p.versions.get(&cur_name))
                            .and_then(|v| v.items.get(&delta_filename))
                            .map(|i| i.sha256.is_none())
                            .unwrap_or(true)
                    };
                    if !delta_existed_before || lacks_hash {
                        let opts = ScanOptions {
                            calc_hashes: true,
                            allow_incomplete: true,
                        };
                        match scanner::get_item(&stream_root, &output_rel, &opts).await {
                            Ok(delta_item) => {
                                let digest = delta_item.sha256.clone().unwrap_or_default();
                                if has_checksums {
                                    let sums_path = stream_root.join(&product_rel).join(&cur_name).join("SHA256SUMS");
                                    let mut guard = catalog.lock().await;
                                    if let Some(version) = guard
                                        .products
                                        .get_mut(&id)
                                        .and_then(|p| p.versions.get_mut(&cur_name))
                                    {
                                        let already_has_entry = version
                                            .checksums
                                            .as_ref()
                                            .map(|c| c.contains_key(&delta_filename))
                                            .unwrap_or(true);
                                        if !already_has_entry {
                                            drop(guard);
                                            let line = format!("{digest}  {delta_filename}\n");
                                            use tokio::io::AsyncWriteExt;
                                            if let Ok(mut file) = tokio::fs::OpenOptions::new()
                                                .create(true)
                                                .append(true)
                                                .open(&sums_path)
                                                .await
                                            {
                                                let _ = file.write_all(line.as_bytes()).await;
                                            }
                                            guard = catalog.lock().await;
                                            if let Some(version) = guard
                                                .products
                                                .get_mut(&id)
                                                .and_then(|p| p.versions.get_mut(&cur_name))
                                            {
                                                version
                                                    .checksums
                                                    .get_or_insert_with(Default::default)
                                                    .insert(delta_filename.clone(), digest.clone());
                                            }
                                        }
                                    }
                                }
                                let mut guard = catalog.lock().await;
                                if let Some(version) = guard
                                    .products
                                    .get_mut(&id)
                                    .and_then(|p| p.versions.get_mut(&cur_name))
                                {
                                    version.items.insert(delta_filename.clone(), delta_item);
                                }
                            }
                            Err(e) => {
                                error!(stream, product = %id, version = %cur_name, item = %delta_filename, error = %e, "failed to hash generated delta");
                            }
                        }
                    }
                })
                .await;
            }
        }
    }
}

/// Runs the full build pipeline for every configured stream, then publishes.
pub async fn run(config: &BuildConfig, cancel: CancellationToken) -> Result<(), BuildError> {
    let metadata_dir = crate::path::metadata_dir(&config.root, &config.stream_version);
    tokio::fs::create_dir_all(&metadata_dir)
        .await
        .map_err(|source| crate::error::PublishError::Io {
            path: metadata_dir.clone(),
            source,
        })?;

    let mut catalogs = BTreeMap::new();

    for stream in &config.streams {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let stream_root = Arc::new(crate::path::stream_dir(&config.root, stream));
        let mut existing = catalog_store::read_catalog(&config.root, &config.stream_version, stream).await?;
        let fresh = scanner::get_products(&stream_root, &ScanOptions::default()).await?;
        let (removed, added) = diff_products(&existing.products, &fresh);
        for id in &removed {
            existing.products.remove(id);
        }
        if !removed.is_empty() {
            info!(stream, count = removed.len(), "dropping products no longer on disk");
        }

        let catalog = Arc::new(Mutex::new(existing));

        let mut pool = WorkerPool::new(config.workers, cancel.clone());
        incorporate_added(stream, stream_root.clone(), catalog.clone(), added, &mut pool).await;
        pool.join().await;

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let mut pool = WorkerPool::new(config.workers, cancel.clone());
        generate_deltas(stream, stream_root.clone(), catalog.clone(), cancel.clone(), &mut pool).await;
        pool.join().await;

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let final_catalog = Arc::try_unwrap(catalog)
            .unwrap_or_else(|arc| panic!("catalog still shared after pool join: {} refs", Arc::strong_count(&arc)))
            .into_inner();
        info!(stream, products = final_catalog.products.len(), "catalog rebuilt");
        catalogs.insert(stream.clone(), final_catalog);
    }

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let updated = crate::clock::now_rfc3339();
    catalog_store::publish(&config.root, &config.stream_version, &catalogs, &updated).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Product;
    use crate::path::ProductIdentity;

    fn product(id: &str) -> Product {
        Product::new(ProductIdentity::new("ubuntu", id, "amd64", "cloud"))
    }

    #[test]
    fn diff_reports_wholly_new_product() {
        let existing = BTreeMap::new();
        let mut fresh = BTreeMap::new();
        fresh.insert("ubuntu:focal:amd64:cloud".to_string(), product("focal"));
        let (removed, added) = diff_products(&existing, &fresh);
        assert!(removed.is_empty());
        assert_eq!(added.len(), 1);
    }

    #[test]
    fn diff_reports_removed_product() {
        let mut existing = BTreeMap::new();
        existing.insert("ubuntu:focal:amd64:cloud".to_string(), product("focal"));
        let fresh = BTreeMap::new();
        let (removed, added) = diff_products(&existing, &fresh);
        assert_eq!(removed, vec!["ubuntu:focal:amd64:cloud".to_string()]);
        assert!(added.is_empty());
    }

    #[test]
    fn diff_reports_only_new_versions_for_existing_product() {
        let mut existing_product = product("focal");
        existing_product
            .versions
            .insert("v1".to_string(), Default::default());
        let mut existing = BTreeMap::new();
        existing.insert("ubuntu:focal:amd64:cloud".to_string(), existing_product);

        let mut fresh_product = product("focal");
        fresh_product.versions.insert("v1".to_string(), Default::default());
        fresh_product.versions.insert("v2".to_string(), Default::default());
        let mut fresh = BTreeMap::new();
        fresh.insert("ubuntu:focal:amd64:cloud".to_string(), fresh_product);

        let (_removed, added) = diff_products(&existing, &fresh);
        let added_product = added.get("ubuntu:focal:amd64:cloud").unwrap();
        assert_eq!(added_product.versions.len(), 1);
        assert!(added_product.versions.contains_key("v2"));
    }

    #[test]
    fn strip_extension_squashfs_and_qcow2() {
        assert_eq!(
            strip_extension("rootfs.squashfs", ftype::SQUASHFS),
            Some(("rootfs", "vcdiff"))
        );
        assert_eq!(
            strip_extension("disk.qcow2", ftype::DISK_KVM_IMG),
            Some(("disk", "qcow2.vcdiff"))
        );
        assert_eq!(strip_extension("lxd.tar.xz", ftype::LXD_TAR_XZ), None);
    }

    async fn write_file(path: &std::path::Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, contents).await.unwrap();
    }

    #[tokio::test]
    async fn scenario_b_checksum_mismatch_excludes_version() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let product_dir = root.join("images/ubuntu/focal/amd64/cloud");

        write_file(&product_dir.join("v1/lxd.tar.xz"), b"metadata").await;
        write_file(&product_dir.join("v1/disk.qcow2"), b"disk-v1").await;

        write_file(&product_dir.join("v2/lxd.tar.xz"), b"test-content").await;
        write_file(&product_dir.join("v2/disk.qcow2"), b"disk-v2").await;
        write_file(
            &product_dir.join("v2/SHA256SUMS"),
            b"0a3666a0710c08aa6d0de92ce72beeb5b93124cce1bf3701c9d6cdeb543cb73e  lxd.tar.xz\n\
              invalid  disk.qcow2\n",
        )
        .await;

        let config = BuildConfig {
            root: root.clone(),
            stream_version: "v1".to_string(),
            streams: vec!["images".to_string()],
            workers: 2,
        };
        run(&config, CancellationToken::new()).await.unwrap();

        let catalog = catalog_store::read_catalog(&root, "v1", "images").await.unwrap();
        let product = catalog.products.get("ubuntu:focal:amd64:cloud").unwrap();
        assert_eq!(product.versions.keys().collect::<Vec<_>>(), vec!["v1"]);
    }

    #[tokio::test]
    async fn scenario_d_atomic_publish_of_two_streams() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        for stream in ["images", "images-daily"] {
            let version_dir = root.join(stream).join("ubuntu/focal/amd64/cloud/20240101_0000");
            write_file(&version_dir.join("lxd.tar.xz"), b"metadata").await;
            write_file(&version_dir.join("rootfs.squashfs"), b"rootfs-bytes").await;
        }

        let config = BuildConfig {
            root: root.clone(),
            stream_version: "v1".to_string(),
            streams: vec!["images".to_string(), "images-daily".to_string()],
            workers: 2,
        };
        run(&config, CancellationToken::new()).await.unwrap();

        assert!(crate::path::catalog_path(&root, "v1", "images").exists());
        assert!(crate::path::catalog_path(&root, "v1", "images-daily").exists());
        let index = catalog_store::read_index(&root, "v1").await.unwrap();
        assert!(index.index.contains_key("images"));
        assert!(index.index.contains_key("images-daily"));
    }

    #[tokio::test]
    #[ignore = "requires the xdelta3 binary on PATH"]
    async fn scenario_c_delta_generation_and_checksum_append() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let product_dir = root.join("images/ubuntu/focal/amd64/cloud");

        for v in ["v1", "v2"] {
            write_file(&product_dir.join(v).join("lxd.tar.xz"), b"metadata").await;
            write_file(&product_dir.join(v).join("disk.qcow2"), b"test-content").await;
        }
        write_file(
            &product_dir.join("v2/SHA256SUMS"),
            b"0a3666a0710c08aa6d0de92ce72beeb5b93124cce1bf3701c9d6cdeb543cb73e  disk.qcow2\n",
        )
        .await;

        let config = BuildConfig {
            root: root.clone(),
            stream_version: "v1".to_string(),
            streams: vec!["images".to_string()],
            workers: 2,
        };
        run(&config, CancellationToken::new()).await.unwrap();

        let catalog = catalog_store::read_catalog(&root, "v1", "images").await.unwrap();
        let product = catalog.products.get("ubuntu:focal:amd64:cloud").unwrap();
        let v2 = product.versions.get("v2").unwrap();
        let delta = v2.items.get("disk.v1.qcow2.vcdiff").unwrap();
        assert_eq!(delta.delta_base.as_deref(), Some("v1"));
        assert!(delta.sha256.is_some());
        let sums_path = product_dir.join("v2/SHA256SUMS");
        let sums = tokio::fs::read_to_string(&sums_path).await.unwrap();
        assert!(sums.contains("disk.v1.qcow2.vcdiff"));
    }
}
