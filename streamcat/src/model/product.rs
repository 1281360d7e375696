//! A distinct image identity `(distro, release, architecture, variant)` and
//! its versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::version::Version;
use crate::path::ProductIdentity;

/// A product's published record within a catalog.
///
/// `identity` (in particular the distro name) is not part of the wire
/// format — it is implied by the product-ID key under which this value is
/// stored in [`super::Catalog::products`] — so it is reconstructed on load
/// rather than serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    /// `(distro, release, arch, variant)`. Not serialized.
    #[serde(skip)]
    pub identity: ProductIdentity,

    /// Comma-joined alternate product paths this product is also reachable
    /// under, e.g. `"ubuntu/noble/default, ubuntu/noble"`.
    pub aliases: String,
    /// Architecture, duplicated from `identity` for the wire format.
    pub arch: String,
    /// Human-readable OS name, e.g. `Ubuntu`.
    pub os: String,
    /// Release, duplicated from `identity` for the wire format.
    pub release: String,
    /// Human-readable release title, e.g. `Noble Numbat`.
    pub release_title: String,
    /// Variant, duplicated from `identity` for the wire format.
    pub variant: String,
    /// Key/value requirements contributed by the last complete version's
    /// image-config.
    pub requirements: BTreeMap<String, String>,
    /// Version name → [`Version`].
    pub versions: BTreeMap<String, Version>,
}

impl Product {
    /// Creates an empty product record for the given identity.
    pub fn new(identity: ProductIdentity) -> Self {
        Self {
            arch: identity.arch.clone(),
            release: identity.release.clone(),
            variant: identity.variant.clone(),
            identity,
            ..Default::default()
        }
    }

    /// Title-cases a distro name for use as a default OS display name, e.g.
    /// `ubuntu` → `Ubuntu`.
    pub fn title_case(distro: &str) -> String {
        let mut chars = distro.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

/// Releases a `release_aliases` entry expands to: the release itself,
/// followed by each comma-separated alias in order.
fn release_names(release: &str, release_aliases: &BTreeMap<String, String>) -> Vec<String> {
    let mut names = vec![release.to_string()];
    if let Some(aliases) = release_aliases.get(release) {
        names.extend(aliases.split(',').map(|a| a.trim().to_string()));
    }
    names
}

/// Builds a product's comma-joined alias list.
///
/// For each release name (the product's own release, then each alias from
/// `release_aliases`): always include `{distro}/{release}/{variant}`; if
/// `variant == "default"`, also include `{distro}/{release}`; if
/// `release == "current"`, also include `{distro}/{variant}`; if both, also
/// include `{distro}`.
pub fn build_aliases(
    distro: &str,
    release: &str,
    variant: &str,
    release_aliases: &BTreeMap<String, String>,
) -> String {
    let mut parts = Vec::new();
    for r in release_names(release, release_aliases) {
        parts.push(format!("{distro}/{r}/{variant}"));
        if variant == "default" {
            parts.push(format!("{distro}/{r}"));
        }
        if r == "current" {
            parts.push(format!("{distro}/{variant}"));
        }
        if variant == "default" && r == "current" {
            parts.push(distro.to_string());
        }
    }
    parts.join(", ")
}
