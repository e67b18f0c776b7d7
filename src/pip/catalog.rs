//! Region catalog: every loaded layer, queryable by point.

use geo::{Point, Rect};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::SpatialLayer;
use crate::error::LookupError;
use crate::models::{Boundary, LayerKey};

/// Read-only set of spatial layers keyed by (scope, boundary type).
///
/// Built once per load and never mutated; reloading builds a new catalog.
/// Layers that were requested but failed to load are remembered as
/// unavailable, so lookups can tell missing coverage from no match.
#[derive(Debug, Default)]
pub struct RegionCatalog {
    layers: BTreeMap<LayerKey, SpatialLayer>,
    unavailable: BTreeSet<LayerKey>,
}

impl RegionCatalog {
    pub fn new(layers: impl IntoIterator<Item = SpatialLayer>) -> Self {
        let mut map = BTreeMap::new();
        for layer in layers {
            let key = layer.key().clone();
            if map.insert(key.clone(), layer).is_some() {
                warn!("Layer {} supplied twice; keeping the later one", key);
            }
        }
        Self {
            layers: map,
            unavailable: BTreeSet::new(),
        }
    }

    /// Mark layers that were requested but did not load
    pub fn with_unavailable(mut self, keys: impl IntoIterator<Item = LayerKey>) -> Self {
        self.unavailable = keys
            .into_iter()
            .filter(|key| !self.layers.contains_key(key))
            .collect();
        self
    }

    /// Boundaries containing the point, grouped by boundary type.
    ///
    /// Every loaded boundary type gets an entry, empty when nothing covers
    /// the point. Types with a layer that failed to load are listed in
    /// [`LookupResult::unavailable`].
    pub fn lookup(&self, lon: f64, lat: f64) -> Result<LookupResult, LookupError> {
        self.lookup_where(lon, lat, |_| true)
    }

    /// Like [`lookup`](Self::lookup), restricted to the given boundary types.
    ///
    /// A type whose layers all failed to load is not an error; it comes back
    /// with no entry and is listed as unavailable. Only types the catalog
    /// never heard of are rejected.
    pub fn lookup_scoped(
        &self,
        lon: f64,
        lat: f64,
        boundary_types: &[&str],
    ) -> Result<LookupResult, LookupError> {
        let mut known = self.boundary_types();
        known.extend(self.unavailable.iter().map(|k| k.boundary_type.as_str()));
        if let Some(unknown) = boundary_types.iter().find(|t| !known.contains(**t)) {
            return Err(LookupError::UnknownBoundaryType(unknown.to_string()));
        }
        self.lookup_where(lon, lat, |t| boundary_types.contains(&t))
    }

    fn lookup_where(
        &self,
        lon: f64,
        lat: f64,
        wanted: impl Fn(&str) -> bool,
    ) -> Result<LookupResult, LookupError> {
        if self.layers.is_empty() {
            return Err(LookupError::EmptyCatalog);
        }
        let point = checked_point(lon, lat)?;

        let mut result = LookupResult::default();
        for layer in self.layers.values() {
            if !wanted(layer.boundary_type()) {
                continue;
            }
            let hits = layer.lookup(&point);
            result
                .matches
                .entry(layer.boundary_type().to_string())
                .or_default()
                .extend(hits);
        }
        result.unavailable = self
            .unavailable
            .iter()
            .map(|k| k.boundary_type.as_str())
            .filter(|&t| wanted(t))
            .map(str::to_string)
            .collect();

        for boundary_type in result.overlapping_types() {
            debug!(
                "({}, {}) lies in {} overlapping {} boundaries",
                lon,
                lat,
                result.get(boundary_type).len(),
                boundary_type
            );
        }

        Ok(result)
    }

    pub fn layer(&self, key: &LayerKey) -> Option<&SpatialLayer> {
        self.layers.get(key)
    }

    pub fn layers(&self) -> impl Iterator<Item = &SpatialLayer> {
        self.layers.values()
    }

    /// Layers that were requested but failed to load
    pub fn unavailable(&self) -> impl Iterator<Item = &LayerKey> {
        self.unavailable.iter()
    }

    /// Distinct boundary types across all loaded layers
    pub fn boundary_types(&self) -> BTreeSet<&str> {
        self.layers.keys().map(|k| k.boundary_type.as_str()).collect()
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total number of boundaries across layers
    pub fn boundary_count(&self) -> usize {
        self.layers.values().map(SpatialLayer::len).sum()
    }

    /// Bounding rectangle covering every layer
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.layers
            .values()
            .filter_map(SpatialLayer::extent)
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }
}

fn checked_point(lon: f64, lat: f64) -> Result<Point<f64>, LookupError> {
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat);
    if valid {
        Ok(Point::new(lon, lat))
    } else {
        Err(LookupError::InvalidCoordinate { lon, lat })
    }
}

/// Matches per boundary type.
///
/// More than one match for a type means the source polygons overlap at the
/// point. Matches are strong `Arc` handles shared with the catalog's layers,
/// so a result stays readable after a reload swaps that catalog out; it
/// keeps those boundaries alive until dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LookupResult {
    matches: BTreeMap<String, Vec<Arc<Boundary>>>,
    #[serde(skip)]
    unavailable: BTreeSet<String>,
}

impl LookupResult {
    /// Matches for a boundary type (empty if none or unknown)
    pub fn get(&self, boundary_type: &str) -> &[Arc<Boundary>] {
        self.matches
            .get(boundary_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, boundary_type: &str) -> Option<&Boundary> {
        self.get(boundary_type).first().map(Arc::as_ref)
    }

    /// True when no boundary type matched
    pub fn is_empty(&self) -> bool {
        self.matches.values().all(Vec::is_empty)
    }

    pub fn boundary_types(&self) -> impl Iterator<Item = &str> {
        self.matches.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<Boundary>])> {
        self.matches.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Queried boundary types with at least one layer that failed to load.
    ///
    /// An empty entry for such a type may be missing coverage rather than a
    /// true absence.
    pub fn unavailable(&self) -> impl Iterator<Item = &str> {
        self.unavailable.iter().map(String::as_str)
    }

    /// Boundary types with more than one match
    pub fn overlapping_types(&self) -> Vec<&str> {
        self.matches
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
