//! Walks a stream subtree, classifies files into items, parses the optional
//! per-version image-config and checksum manifest, and decides version
//! completeness.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::ScanError;
use crate::hasher;
use crate::image_config::{self, ImageConfig};
use crate::model::{build_aliases, ftype, Item, Product, Version};
use crate::path::{self, ProductIdentity};

/// Options threaded through every scan operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Compute SHA-256 (and combined) hashes while scanning.
    pub calc_hashes: bool,
    /// Don't fail on hidden or incomplete versions; return them as-is with
    /// `incomplete` set.
    pub allow_incomplete: bool,
}

fn io_err(path: &Path, source: std::io::Error) -> ScanError {
    if source.kind() == std::io::ErrorKind::NotFound {
        ScanError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ScanError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Stats a single file under `root_dir` and builds its [`Item`].
pub async fn get_item(root_dir: &Path, rel_path: &Path, opts: &ScanOptions) -> Result<Item, ScanError> {
    let full_path = root_dir.join(rel_path);
    let metadata = fs::metadata(&full_path)
        .await
        .map_err(|source| io_err(&full_path, source))?;
    let filename = rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (ftype, delta_base) =
        Item::classify_filename(filename).unwrap_or_else(|| (filename.to_string(), None));
    let sha256 = if opts.calc_hashes {
        Some(hasher::single_file_hash(&full_path).await?)
    } else {
        None
    };
    Ok(Item {
        ftype,
        path: to_slash(rel_path),
        size: metadata.len(),
        sha256,
        combined_disk_kvm_img_sha256: None,
        combined_squashfs_sha256: None,
        combined_rootxz_sha256: None,
        delta_base,
    })
}

/// Parses a `SHA256SUMS` file: whitespace-separated `<hex>  <filename>`
/// lines, trimmed, malformed lines ignored, later duplicate filenames win.
pub fn parse_sha256sums(contents: &str) -> BTreeMap<String, String> {
    let mut checksums = BTreeMap::new();
    for line in contents.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(hex), Some(filename)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        checksums.insert(filename.to_string(), hex.to_lowercase());
    }
    checksums
}

/// Scans a single version directory.
pub async fn get_version(
    root_dir: &Path,
    version_rel_path: &Path,
    opts: &ScanOptions,
) -> Result<Version, ScanError> {
    let version_name = version_rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let hidden = path::is_hidden_version(&version_name);
    if hidden && !opts.allow_incomplete {
        return Err(ScanError::VersionIncomplete {
            version: version_name,
            reason: "hidden (leading dot)".to_string(),
        });
    }

    let version_dir = root_dir.join(version_rel_path);
    let mut entries = fs::read_dir(&version_dir)
        .await
        .map_err(|source| io_err(&version_dir, source))?;

    let mut items = BTreeMap::new();
    let mut checksums: Option<BTreeMap<String, String>> = None;
    let mut image_config: Option<ImageConfig> = None;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_err(&version_dir, source))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "SHA256SUMS" {
            let contents = fs::read_to_string(entry.path())
                .await
                .map_err(|source| io_err(&entry.path(), source))?;
            checksums = Some(parse_sha256sums(&contents));
            continue;
        }
        if name == "image.yaml" {
            let contents = fs::read_to_string(entry.path())
                .await
                .map_err(|source| io_err(&entry.path(), source))?;
            let parsed = serde_yaml::from_str(&contents).map_err(|source| {
                ScanError::InvalidImageConfig {
                    version: version_name.clone(),
                    source,
                }
            })?;
            image_config = Some(parsed);
            continue;
        }
        if Item::classify_filename(&name).is_none() {
            continue;
        }
        let item_rel_path = version_rel_path.join(&name);
        let item = get_item(root_dir, &item_rel_path, opts).await?;
        items.insert(name, item);
    }

    let has_metadata = items.values().any(|i| i.ftype == ftype::LXD_TAR_XZ);
    if has_metadata && opts.calc_hashes {
        let metadata_name = items
            .iter()
            .find(|(_, i)| i.ftype == ftype::LXD_TAR_XZ)
            .map(|(name, _)| name.clone());
        if let Some(metadata_name) = metadata_name {
            let metadata_path = root_dir.join(version_rel_path).join(&metadata_name);
            let mut combined_squashfs = None;
            let mut combined_disk_kvm_img = None;
            let mut combined_rootxz = None;
            for (name, item) in items.iter() {
                if name == &metadata_name {
                    continue;
                }
                let slot = match item.ftype.as_str() {
                    ftype::SQUASHFS => Some(&mut combined_squashfs),
                    ftype::DISK_KVM_IMG => Some(&mut combined_disk_kvm_img),
                    ftype::ROOT_TAR_XZ => Some(&mut combined_rootxz),
                    _ => None,
                };
                if let Some(slot) = slot {
                    let item_path = root_dir.join(version_rel_path).join(name);
                    *slot = Some(hasher::file_hash(&[&metadata_path, &item_path]).await?);
                }
            }
            if let Some(metadata_item) = items.get_mut(&metadata_name) {
                metadata_item.combined_squashfs_sha256 = combined_squashfs;
                metadata_item.combined_disk_kvm_img_sha256 = combined_disk_kvm_img;
                metadata_item.combined_rootxz_sha256 = combined_rootxz;
            }
        }
    }

    let has_rootfs = items
        .values()
        .any(|i| i.ftype == ftype::SQUASHFS || i.ftype == ftype::DISK_KVM_IMG);
    let incomplete = hidden || !(has_metadata && has_rootfs);

    if incomplete && !opts.allow_incomplete {
        let reason = if !has_metadata {
            "missing lxd.tar.xz"
        } else {
            "missing squashfs or disk-kvm.img rootfs"
        };
        return Err(ScanError::VersionIncomplete {
            version: version_name,
            reason: reason.to_string(),
        });
    }

    Ok(Version {
        items,
        checksums,
        image_config,
        incomplete,
    })
}

/// Scans a single product directory (four path components under the stream
/// root: `distro/release/arch/variant`).
pub async fn get_product(
    stream_root: &Path,
    product_rel_path: &Path,
    opts: &ScanOptions,
) -> Result<Product, ScanError> {
    let identity =
        path::parse_product_rel_path(product_rel_path).ok_or_else(|| ScanError::InvalidProductPath {
            path: product_rel_path.to_path_buf(),
        })?;

    let product_dir = stream_root.join(product_rel_path);
    let metadata = fs::metadata(&product_dir).await.map_err(|_| ScanError::InvalidProductPath {
        path: product_rel_path.to_path_buf(),
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::InvalidProductPath {
            path: product_rel_path.to_path_buf(),
        });
    }

    let mut entries = fs::read_dir(&product_dir)
        .await
        .map_err(|source| io_err(&product_dir, source))?;

    let mut versions = BTreeMap::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_err(&product_dir, source))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map_err(|source| io_err(&entry.path(), source))?
            .is_dir();
        if !is_dir {
            continue;
        }
        let version_name = entry.file_name().to_string_lossy().into_owned();
        let version_rel_path = product_rel_path.join(&version_name);
        match get_version(stream_root, &version_rel_path, opts).await {
            Ok(version) => {
                versions.insert(version_name, version);
            }
            Err(ScanError::VersionIncomplete { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    let mut product = Product::new(identity.clone());
    product.os = Product::title_case(&identity.distro);
    product.release_title = Product::title_case(&identity.release);

    if let Some((_, last_version)) = versions.iter().next_back() {
        if let Some(cfg) = &last_version.image_config {
            if let Some(distro_name) = &cfg.simplestream.distro_name {
                product.os = distro_name.clone();
            }
            product.requirements = image_config::resolve_requirements(
                &cfg.simplestream.requirements,
                &identity.release,
                &identity.arch,
                &identity.variant,
            );
            product.aliases = build_aliases(
                &identity.distro,
                &identity.release,
                &identity.variant,
                &cfg.simplestream.release_aliases,
            );
        }
    }
    if product.aliases.is_empty() {
        product.aliases = build_aliases(
            &identity.distro,
            &identity.release,
            &identity.variant,
            &BTreeMap::new(),
        );
    }
    product.versions = versions;
    Ok(product)
}

async fn collect_depth4(
    stream_root: &Path,
    rel: PathBuf,
    depth: u32,
    out: &mut Vec<PathBuf>,
) -> Result<(), ScanError> {
    if depth == 4 {
        out.push(rel);
        return Ok(());
    }
    let dir = stream_root.join(&rel);
    let mut entries = fs::read_dir(&dir)
        .await
        .map_err(|source| io_err(&dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_err(&dir, source))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map_err(|source| io_err(&entry.path(), source))?
            .is_dir();
        if is_dir {
            Box::pin(collect_depth4(stream_root, rel.join(entry.file_name()), depth + 1, out)).await?;
        }
    }
    Ok(())
}

/// Scans every product under `stream_root`, keyed by product ID.
pub async fn get_products(
    stream_root: &Path,
    opts: &ScanOptions,
) -> Result<BTreeMap<String, Product>, ScanError> {
    let mut candidates = Vec::new();
    collect_depth4(stream_root, PathBuf::new(), 0, &mut candidates).await?;

    let mut products = BTreeMap::new();
    for rel in candidates {
        match get_product(stream_root, &rel, opts).await {
            Ok(product) if !product.versions.is_empty() => {
                products.insert(product.identity.id(), product);
            }
            Ok(_) => {}
            Err(ScanError::InvalidProductPath { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(products)
}
