//! Optional per-version `image.yaml` metadata: a product name override,
//! release aliases, and a list of filtered requirement entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level `image.yaml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// The `simplestream` table.
    pub simplestream: SimplestreamConfig,
}

/// The `simplestream` table of `image.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimplestreamConfig {
    /// Overrides the catalog's distro display name for this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro_name: Option<String>,

    /// Maps a release name to a comma-separated alias list, e.g.
    /// `noble: "24,24.04"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub release_aliases: BTreeMap<String, String>,

    /// Filtered requirement entries, applied in document order.
    #[serde(default)]
    pub requirements: Vec<RequirementEntry>,
}

/// One entry of `simplestream.requirements`: a `key → expected-value` map
/// that applies only to products matching the given filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementEntry {
    /// The requirement key/value pairs contributed by this entry.
    pub requirements: BTreeMap<String, String>,
    /// Releases this entry applies to. Absent means "any release".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases: Option<Vec<String>>,
    /// Architectures this entry applies to. Absent means "any architecture".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architectures: Option<Vec<String>>,
    /// Variants this entry applies to. Absent means "any variant".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<String>>,
}

impl RequirementEntry {
    /// An entry applies iff each of its filter lists is absent, or present
    /// and contains the corresponding product field.
    fn applies_to(&self, release: &str, arch: &str, variant: &str) -> bool {
        Self::list_matches(&self.releases, release)
            && Self::list_matches(&self.architectures, arch)
            && Self::list_matches(&self.variants, variant)
    }

    fn list_matches(list: &Option<Vec<String>>, value: &str) -> bool {
        match list {
            None => true,
            Some(values) => values.iter().any(|v| v == value),
        }
    }
}

/// Merges the requirement entries that apply to `(release, arch, variant)`,
/// in document order, later entries overwriting earlier keys.
pub fn resolve_requirements(
    entries: &[RequirementEntry],
    release: &str,
    arch: &str,
    variant: &str,
) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for entry in entries {
        if entry.applies_to(release, arch, variant) {
            for (k, v) in &entry.requirements {
                resolved.insert(k.clone(), v.clone());
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_entry_always_applies() {
        let entries = vec![RequirementEntry {
            requirements: BTreeMap::from([("boot".to_string(), "efi".to_string())]),
            releases: None,
            architectures: None,
            variants: None,
        }];
        let resolved = resolve_requirements(&entries, "focal", "arm64", "cloud");
        assert_eq!(resolved.get("boot").map(String::as_str), Some("efi"));
    }

    #[test]
    fn filtered_entry_applies_only_to_matching_products() {
        let entries = vec![RequirementEntry {
            requirements: BTreeMap::from([("boot".to_string(), "efi".to_string())]),
            releases: Some(vec!["focal".to_string()]),
            architectures: None,
            variants: None,
        }];
        assert!(!resolve_requirements(&entries, "jammy", "amd64", "cloud").contains_key("boot"));
        assert!(resolve_requirements(&entries, "focal", "amd64", "cloud").contains_key("boot"));
    }

    #[test]
    fn later_entries_overwrite_earlier_keys() {
        let entries = vec![
            RequirementEntry {
                requirements: BTreeMap::from([("boot".to_string(), "bios".to_string())]),
                releases: None,
                architectures: None,
                variants: None,
            },
            RequirementEntry {
                requirements: BTreeMap::from([("boot".to_string(), "efi".to_string())]),
                releases: None,
                architectures: None,
                variants: None,
            },
        ];
        let resolved = resolve_requirements(&entries, "focal", "amd64", "cloud");
        assert_eq!(resolved.get("boot").map(String::as_str), Some("efi"));
    }

    #[test]
    fn parses_yaml_document() {
        let yaml = r#"
simplestream:
  distro_name: my-distro
  release_aliases:
    noble: "24,24.04"
  requirements:
    - requirements:
        boot: efi
      architectures:
        - amd64
"#;
        let cfg: ImageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.simplestream.distro_name.as_deref(), Some("my-distro"));
        assert_eq!(
            cfg.simplestream.release_aliases.get("noble").map(String::as_str),
            Some("24,24.04")
        );
        assert_eq!(cfg.simplestream.requirements.len(), 1);
        assert_eq!(
            cfg.simplestream.requirements[0].architectures,
            Some(vec!["amd64".to_string()])
        );
    }
}
