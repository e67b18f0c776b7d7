//! A single normalized boundary feature.

use geo::{BoundingRect, MultiPolygon};
use serde::Serialize;
use std::collections::BTreeMap;

/// One geographic feature of a spatial layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Boundary {
    /// Unique within its layer only
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub geometry: MultiPolygon<f64>,
    /// Auxiliary canonical fields (e.g. `county_name`)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Boundary {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
