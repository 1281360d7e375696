//! A single file within a version, typed by filename/extension.

use serde::{Deserialize, Serialize};

/// Known file-type tags. The wire format stores `ftype` as a plain string
/// (unrecognized `.tar.xz` files fall back to their filename), so these are
/// constants rather than a closed enum.
pub mod ftype {
    /// Container rootfs.
    pub const SQUASHFS: &str = "squashfs";
    /// VM disk image.
    pub const DISK_KVM_IMG: &str = "disk-kvm.img";
    /// Delta between two VM disk images.
    pub const DISK_KVM_IMG_VCDIFF: &str = "disk-kvm.img.vcdiff";
    /// Delta between two container rootfs images.
    pub const SQUASHFS_VCDIFF: &str = "squashfs.vcdiff";
    /// LXD metadata tarball.
    pub const LXD_TAR_XZ: &str = "lxd.tar.xz";
    /// Plain rootfs tarball.
    pub const ROOT_TAR_XZ: &str = "root.tar.xz";
}

/// A single file within a [`super::Version`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// File-type tag; one of the [`ftype`] constants, or a raw filename for
    /// an unrecognized `.tar.xz` file.
    pub ftype: String,
    /// Path relative to the repository root.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// SHA-256 hex digest of the file, if computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// SHA-256 over `concat(metadata_bytes, disk-kvm.img bytes)`, stored only
    /// on the metadata item.
    #[serde(
        rename = "combined_disk-kvm-img_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_disk_kvm_img_sha256: Option<String>,
    /// SHA-256 over `concat(metadata_bytes, squashfs bytes)`, stored only on
    /// the metadata item.
    #[serde(
        rename = "combined_squashfs_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_squashfs_sha256: Option<String>,
    /// SHA-256 over `concat(metadata_bytes, root.tar.xz bytes)`, stored only
    /// on the metadata item.
    #[serde(
        rename = "combined_rootxz_sha256",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub combined_rootxz_sha256: Option<String>,
    /// For delta items, the version name this delta is based on.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delta_base: Option<String>,
}

impl Item {
    /// Returns the nth dot-separated segment counted from the end of
    /// `filename` (1 = last segment), or `None` if there are fewer segments.
    fn nth_from_last_dot_segment(filename: &str, n: usize) -> Option<String> {
        let segments: Vec<&str> = filename.split('.').collect();
        if segments.len() < n {
            return None;
        }
        Some(segments[segments.len() - n].to_string())
    }

    /// Classifies a filename into `(ftype, delta_base)` per the extension
    /// table. Returns `None` if the filename is not one of the allowed
    /// item extensions (`.tar.xz`, `.squashfs`, `.vcdiff`, `.qcow2`,
    /// `.qcow2.vcdiff`).
    pub fn classify_filename(filename: &str) -> Option<(String, Option<String>)> {
        if filename == "lxd.tar.xz" {
            return Some((ftype::LXD_TAR_XZ.to_string(), None));
        }
        if filename == "root.tar.xz" {
            return Some((ftype::ROOT_TAR_XZ.to_string(), None));
        }
        if filename.ends_with(".squashfs") {
            return Some((ftype::SQUASHFS.to_string(), None));
        }
        if filename.ends_with(".qcow2.vcdiff") {
            let delta_base = Self::nth_from_last_dot_segment(filename, 3);
            return Some((ftype::DISK_KVM_IMG_VCDIFF.to_string(), delta_base));
        }
        if filename.ends_with(".qcow2") {
            return Some((ftype::DISK_KVM_IMG.to_string(), None));
        }
        if filename.ends_with(".vcdiff") {
            let delta_base = Self::nth_from_last_dot_segment(filename, 2);
            return Some((ftype::SQUASHFS_VCDIFF.to_string(), delta_base));
        }
        if filename.ends_with(".tar.xz") {
            // Unrecognized metadata/rootfs tarball: keep the filename as a
            // free-form ftype tag.
            return Some((filename.to_string(), None));
        }
        None
    }
}
