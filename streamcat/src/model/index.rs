//! The top-level stream index (`index:1.0`) enumerating available product
//! catalogs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::Catalog;

/// `streams/<version>/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Always `"index:1.0"`.
    pub format: String,
    /// Stream name → [`IndexEntry`].
    pub index: BTreeMap<String, IndexEntry>,
}

/// One stream's entry within the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Always `"image-downloads"`.
    pub datatype: String,
    /// Always `"products:1.0"`.
    pub format: String,
    /// Path of the stream's catalog JSON, relative to the repository root.
    pub path: String,
    /// RFC3339 timestamp of when this entry was last rebuilt.
    pub updated: String,
    /// Lexicographically sorted list of product IDs in the stream's catalog.
    pub products: Vec<String>,
}

impl Index {
    /// Format tag for the stream index.
    pub const FORMAT: &'static str = "index:1.0";

    /// Creates an empty index.
    pub fn empty() -> Self {
        Self {
            format: Self::FORMAT.to_string(),
            index: BTreeMap::new(),
        }
    }

    /// Builds the entry for `stream`'s catalog: `path` relative to the
    /// repository root, `updated` as an already-formatted RFC3339 timestamp,
    /// and a sorted product-ID list read off `catalog`.
    pub fn entry_for(stream: &str, path: String, updated: String, catalog: &Catalog) -> IndexEntry {
        let mut products: Vec<String> = catalog.products.keys().cloned().collect();
        products.sort();
        IndexEntry {
            datatype: Catalog::DATATYPE.to_string(),
            format: Catalog::FORMAT.to_string(),
            path,
            updated,
            products,
        }
    }

    /// Inserts or replaces `stream`'s entry.
    pub fn set(&mut self, stream: &str, entry: IndexEntry) {
        self.index.insert(stream.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_has_expected_format() {
        let index = Index::empty();
        assert_eq!(index.format, "index:1.0");
        assert!(index.index.is_empty());
    }

    #[test]
    fn entry_product_list_is_sorted() {
        let mut catalog = Catalog::empty("images");
        catalog
            .products
            .insert("ubuntu:focal:amd64:cloud".to_string(), Default::default());
        catalog
            .products
            .insert("alpine:3.19:amd64:default".to_string(), Default::default());
        let entry = Index::entry_for(
            "images",
            "streams/v1/images.json".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
            &catalog,
        );
        assert_eq!(
            entry.products,
            vec![
                "alpine:3.19:amd64:default".to_string(),
                "ubuntu:focal:amd64:cloud".to_string(),
            ]
        );
    }
}
