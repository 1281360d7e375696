//! The per-stream product catalog (`products:1.0`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::product::Product;

/// One stream's product catalog.
///
/// `products` is a [`BTreeMap`] rather than a hash map so that repeated
/// scans of an unchanged tree serialize to byte-identical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Equals the stream name, e.g. `images`.
    pub content_id: String,
    /// Always `"products:1.0"`.
    pub format: String,
    /// Always `"image-downloads"`.
    pub datatype: String,
    /// Product ID (`"{distro}:{release}:{arch}:{variant}"`) → [`Product`].
    pub products: BTreeMap<String, Product>,
}

impl Catalog {
    /// Format tag for a product catalog.
    pub const FORMAT: &'static str = "products:1.0";
    /// Datatype tag for a product catalog.
    pub const DATATYPE: &'static str = "image-downloads";

    /// Creates an empty catalog for `stream`.
    pub fn empty(stream: &str) -> Self {
        Self {
            content_id: stream.to_string(),
            format: Self::FORMAT.to_string(),
            datatype: Self::DATATYPE.to_string(),
            products: BTreeMap::new(),
        }
    }
}
