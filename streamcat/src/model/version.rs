//! A dated build of a product: a directory containing a metadata file and at
//! least one rootfs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::item::{ftype, Item};
use crate::image_config::ImageConfig;

/// A single version directory's contents.
///
/// Only `items` is part of the wire format; `checksums`, `image_config`, and
/// `incomplete` are scan-time bookkeeping that never gets published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Version {
    /// File name → [`Item`], for every file recognized as an item.
    pub items: BTreeMap<String, Item>,

    /// Parsed `SHA256SUMS`, filename → lowercase hex digest. `None` if no
    /// manifest was present.
    #[serde(skip)]
    pub checksums: Option<BTreeMap<String, String>>,

    /// Parsed `image.yaml`, if present.
    #[serde(skip)]
    pub image_config: Option<ImageConfig>,

    /// True if the version is missing mandatory files, or hidden. Derived at
    /// scan time, never serialized.
    #[serde(skip)]
    pub incomplete: bool,
}

impl Version {
    /// A version is complete iff it has a metadata file (`lxd.tar.xz`) and at
    /// least one rootfs (`squashfs` or `disk-kvm.img`).
    pub fn is_complete(&self) -> bool {
        let has_metadata = self
            .items
            .values()
            .any(|item| item.ftype == ftype::LXD_TAR_XZ);
        let has_rootfs = self
            .items
            .values()
            .any(|item| item.ftype == ftype::SQUASHFS || item.ftype == ftype::DISK_KVM_IMG);
        has_metadata && has_rootfs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ftype: &str) -> Item {
        Item {
            ftype: ftype.to_string(),
            path: format!("path/{ftype}"),
            size: 1,
            sha256: None,
            combined_disk_kvm_img_sha256: None,
            combined_squashfs_sha256: None,
            combined_rootxz_sha256: None,
            delta_base: None,
        }
    }

    #[test]
    fn incomplete_without_metadata() {
        let mut v = Version::default();
        v.items.insert("rootfs.squashfs".into(), item(ftype::SQUASHFS));
        assert!(!v.is_complete());
    }

    #[test]
    fn incomplete_without_rootfs() {
        let mut v = Version::default();
        v.items.insert("lxd.tar.xz".into(), item(ftype::LXD_TAR_XZ));
        assert!(!v.is_complete());
    }

    #[test]
    fn complete_with_squashfs() {
        let mut v = Version::default();
        v.items.insert("lxd.tar.xz".into(), item(ftype::LXD_TAR_XZ));
        v.items.insert("rootfs.squashfs".into(), item(ftype::SQUASHFS));
        assert!(v.is_complete());
    }

    #[test]
    fn complete_with_disk_kvm_img() {
        let mut v = Version::default();
        v.items.insert("lxd.tar.xz".into(), item(ftype::LXD_TAR_XZ));
        v.items.insert("disk.qcow2".into(), item(ftype::DISK_KVM_IMG));
        assert!(v.is_complete());
    }

    #[test]
    fn serialization_only_includes_items() {
        let mut v = Version::default();
        v.items.insert("lxd.tar.xz".into(), item(ftype::LXD_TAR_XZ));
        v.checksums = Some(BTreeMap::from([("lxd.tar.xz".to_string(), "abc".to_string())]));
        v.incomplete = true;
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("checksums").is_none());
        assert!(json.get("incomplete").is_none());
        assert!(json.get("image_config").is_none());
        assert!(json["items"].get("lxd.tar.xz").is_some());
    }
}
