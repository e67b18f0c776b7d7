//! One boundary type's normalized, indexed features.

use geo::{Point, Rect};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::index::LayerIndex;
use crate::models::{Boundary, JurisdictionScope, LayerKey};

/// Boundaries of one (scope, boundary type) plus their R-tree.
///
/// The collection is immutable; replacing it builds a new layer with a new
/// index.
pub struct SpatialLayer {
    key: LayerKey,
    boundaries: Vec<Arc<Boundary>>,
    index: LayerIndex,
    extent: Option<Rect<f64>>,
}

impl SpatialLayer {
    pub fn new(key: LayerKey, boundaries: Vec<Boundary>) -> Self {
        let boundaries: Vec<Arc<Boundary>> = boundaries.into_iter().map(Arc::new).collect();
        let index = LayerIndex::build(&boundaries);
        let extent = total_extent(&boundaries);

        debug!(
            "Layer {} built with {} boundaries ({} indexed)",
            key,
            boundaries.len(),
            index.len()
        );

        Self {
            key,
            boundaries,
            index,
            extent,
        }
    }

    /// New layer with the same key over a replacement collection
    pub fn with_boundaries(&self, boundaries: Vec<Boundary>) -> Self {
        Self::new(self.key.clone(), boundaries)
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn scope(&self) -> &JurisdictionScope {
        &self.key.scope
    }

    pub fn boundary_type(&self) -> &str {
        &self.key.boundary_type
    }

    /// Boundaries in source order
    pub fn boundaries(&self) -> &[Arc<Boundary>] {
        &self.boundaries
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Boundary>> {
        self.boundaries.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Bounding rectangle of every boundary in the layer
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }

    /// Boundaries containing `point` (closed-region rule), in source order
    pub fn lookup(&self, point: &Point<f64>) -> Vec<Arc<Boundary>> {
        match self.extent {
            Some(extent) if covers(&extent, point) => self.index.lookup(point),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for SpatialLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialLayer")
            .field("key", &self.key)
            .field("boundaries", &self.boundaries.len())
            .field("extent", &self.extent)
            .finish()
    }
}

fn covers(rect: &Rect<f64>, point: &Point<f64>) -> bool {
    point.x() >= rect.min().x
        && point.x() <= rect.max().x
        && point.y() >= rect.min().y
        && point.y() <= rect.max().y
}

fn total_extent(boundaries: &[Arc<Boundary>]) -> Option<Rect<f64>> {
    boundaries
        .iter()
        .filter_map(|b| b.bbox())
        .reduce(|(ax0, ay0, ax1, ay1), (bx0, by0, bx1, by1)| {
            (ax0.min(bx0), ay0.min(by0), ax1.max(bx1), ay1.max(by1))
        })
        .map(|(x0, y0, x1, y1)| Rect::new((x0, y0), (x1, y1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> Boundary {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ];
        Boundary::new(id, format!("square {}", id), MultiPolygon::new(vec![poly]))
    }

    fn key() -> LayerKey {
        LayerKey::new(JurisdictionScope::State, "precinct")
    }

    #[test]
    fn test_centroid_matches_and_outside_misses() {
        let layer = SpatialLayer::new(key(), vec![square("a", 0.0, 0.0, 10.0)]);

        let hits = layer.lookup(&Point::new(5.0, 5.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        // 2 units outside the bounding box
        assert!(layer.lookup(&Point::new(12.0, 5.0)).is_empty());
        assert!(layer.lookup(&Point::new(5.0, -2.0)).is_empty());
    }

    #[test]
    fn test_shared_edge_is_deterministic() {
        let layer = SpatialLayer::new(
            key(),
            vec![square("west", 0.0, 0.0, 1.0), square("east", 1.0, 0.0, 1.0)],
        );
        let on_edge = Point::new(1.0, 0.5);

        let first: Vec<String> = layer.lookup(&on_edge).iter().map(|b| b.id.clone()).collect();
        // Closed regions: both neighbours contain the edge point
        assert_eq!(first, vec!["west".to_string(), "east".to_string()]);

        for _ in 0..50 {
            let again: Vec<String> =
                layer.lookup(&on_edge).iter().map(|b| b.id.clone()).collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_hole_is_excluded() {
        let donut = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0)]],
        );
        let layer = SpatialLayer::new(
            key(),
            vec![Boundary::new("d", "donut", MultiPolygon::new(vec![donut]))],
        );

        assert!(layer.lookup(&Point::new(5.0, 5.0)).is_empty());
        assert_eq!(layer.lookup(&Point::new(2.0, 2.0)).len(), 1);
    }

    #[test]
    fn test_replacement_rebuilds_index() {
        let layer = SpatialLayer::new(key(), vec![square("a", 0.0, 0.0, 1.0)]);
        let replaced = layer.with_boundaries(vec![square("b", 5.0, 5.0, 1.0)]);

        assert_eq!(layer.lookup(&Point::new(0.5, 0.5)).len(), 1);
        assert!(replaced.lookup(&Point::new(0.5, 0.5)).is_empty());
        assert_eq!(replaced.lookup(&Point::new(5.5, 5.5))[0].id, "b");
        assert_eq!(replaced.key(), layer.key());
    }

    #[test]
    fn test_extent_and_get() {
        let layer = SpatialLayer::new(
            key(),
            vec![square("a", 0.0, 0.0, 1.0), square("b", 3.0, 4.0, 1.0)],
        );
        let extent = layer.extent().unwrap();
        assert_eq!((extent.min().x, extent.min().y), (0.0, 0.0));
        assert_eq!((extent.max().x, extent.max().y), (4.0, 5.0));
        assert_eq!(layer.get("b").unwrap().name, "square b");
        assert!(layer.get("c").is_none());
    }
}
