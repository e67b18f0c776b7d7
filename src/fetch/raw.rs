//! Format-agnostic output of the fetch stage.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::Crs;

/// One feature as delivered by the source, attributes untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    pub attributes: Map<String, Value>,
    pub geometry: Option<MultiPolygon<f64>>,
}

/// Un-normalized features of one feed, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatureCollection {
    pub features: Vec<RawFeature>,
    pub crs: Crs,
}

impl RawFeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
