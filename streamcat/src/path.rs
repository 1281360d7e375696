//! Pure path/identity functions: mapping between on-disk directory paths and
//! product/version identity, and back. No I/O happens here.

use std::path::{Path, PathBuf};

/// Identity of a product: `(distro, release, architecture, variant)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductIdentity {
    /// Distribution name, e.g. `ubuntu`.
    pub distro: String,
    /// Release name, e.g. `focal`.
    pub release: String,
    /// Architecture, e.g. `amd64`.
    pub arch: String,
    /// Variant, e.g. `cloud` or `default`.
    pub variant: String,
}

impl ProductIdentity {
    /// Creates a new product identity from its four components.
    pub fn new(
        distro: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            distro: distro.into(),
            release: release.into(),
            arch: arch.into(),
            variant: variant.into(),
        }
    }

    /// Returns the product ID string `"{distro}:{release}:{arch}:{variant}"`.
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.distro, self.release, self.arch, self.variant
        )
    }

    /// Returns the path of this product relative to its stream root:
    /// `{distro}/{release}/{arch}/{variant}`.
    pub fn rel_path(&self) -> PathBuf {
        PathBuf::from(&self.distro)
            .join(&self.release)
            .join(&self.arch)
            .join(&self.variant)
    }
}

/// Parses a product-ID string (`"{distro}:{release}:{arch}:{variant}"`)
/// back into a [`ProductIdentity`].
pub fn parse_product_id(id: &str) -> Option<ProductIdentity> {
    let parts: Vec<&str> = id.split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    Some(ProductIdentity::new(parts[0], parts[1], parts[2], parts[3]))
}

/// Parses a product-relative path into a [`ProductIdentity`].
///
/// Returns `None` unless `rel_path` has exactly four components.
pub fn parse_product_rel_path(rel_path: &Path) -> Option<ProductIdentity> {
    let parts: Vec<&str> = rel_path
        .components()
        .map(|c| c.as_os_str().to_str().unwrap_or(""))
        .collect();
    if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(ProductIdentity::new(parts[0], parts[1], parts[2], parts[3]))
}

/// Returns the directory of a specific version under a product directory.
pub fn version_dir(product_dir: &Path, version: &str) -> PathBuf {
    product_dir.join(version)
}

/// Returns true if a version directory name marks a hidden, in-progress
/// upload (starts with `.`).
pub fn is_hidden_version(name: &str) -> bool {
    name.starts_with('.')
}

/// Returns the root directory of a stream: `{root}/{stream}`.
pub fn stream_dir(root: &Path, stream: &str) -> PathBuf {
    root.join(stream)
}

/// Returns the metadata directory for a stream-version:
/// `{root}/streams/{stream_version}`.
pub fn metadata_dir(root: &Path, stream_version: &str) -> PathBuf {
    root.join("streams").join(stream_version)
}

/// Returns the path of a stream's catalog JSON file.
pub fn catalog_path(root: &Path, stream_version: &str, stream: &str) -> PathBuf {
    metadata_dir(root, stream_version).join(format!("{stream}.json"))
}

/// Returns the path of a stream's gzipped catalog JSON file.
pub fn catalog_gz_path(root: &Path, stream_version: &str, stream: &str) -> PathBuf {
    metadata_dir(root, stream_version).join(format!("{stream}.json.gz"))
}

/// Returns the path of the stream-version's index JSON file.
pub fn index_path(root: &Path, stream_version: &str) -> PathBuf {
    metadata_dir(root, stream_version).join("index.json")
}

/// Returns the path of the stream-version's gzipped index JSON file.
pub fn index_gz_path(root: &Path, stream_version: &str) -> PathBuf {
    metadata_dir(root, stream_version).join("index.json.gz")
}

/// Returns the path of a product's directory relative to the stream root.
pub fn product_dir(stream_root: &Path, identity: &ProductIdentity) -> PathBuf {
    stream_root.join(identity.rel_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_format() {
        let id = ProductIdentity::new("ubuntu", "focal", "amd64", "cloud");
        assert_eq!(id.id(), "ubuntu:focal:amd64:cloud");
    }

    #[test]
    fn rel_path_has_four_components() {
        let id = ProductIdentity::new("ubuntu", "focal", "amd64", "cloud");
        assert_eq!(id.rel_path(), Path::new("ubuntu/focal/amd64/cloud"));
    }

    #[test]
    fn parse_valid_product_path() {
        let identity = parse_product_rel_path(Path::new("ubuntu/focal/amd64/cloud")).unwrap();
        assert_eq!(identity.distro, "ubuntu");
        assert_eq!(identity.release, "focal");
        assert_eq!(identity.arch, "amd64");
        assert_eq!(identity.variant, "cloud");
    }

    #[test]
    fn parse_rejects_wrong_component_count() {
        assert!(parse_product_rel_path(Path::new("ubuntu/focal/amd64")).is_none());
        assert!(parse_product_rel_path(Path::new("ubuntu/focal/amd64/cloud/extra")).is_none());
    }

    #[test]
    fn hidden_version_detection() {
        assert!(is_hidden_version(".20240101_0000"));
        assert!(!is_hidden_version("20240101_0000"));
    }

    #[test]
    fn product_id_round_trips() {
        let id = ProductIdentity::new("ubuntu", "focal", "amd64", "cloud");
        let parsed = parse_product_id(&id.id()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_product_id_rejects_wrong_component_count() {
        assert!(parse_product_id("ubuntu:focal:amd64").is_none());
    }

    #[test]
    fn catalog_and_index_paths() {
        let root = Path::new("/srv/images");
        assert_eq!(
            catalog_path(root, "v1", "images"),
            Path::new("/srv/images/streams/v1/images.json")
        );
        assert_eq!(
            catalog_gz_path(root, "v1", "images"),
            Path::new("/srv/images/streams/v1/images.json.gz")
        );
        assert_eq!(
            index_path(root, "v1"),
            Path::new("/srv/images/streams/v1/index.json")
        );
        assert_eq!(
            index_gz_path(root, "v1"),
            Path::new("/srv/images/streams/v1/index.json.gz")
        );
    }
}
