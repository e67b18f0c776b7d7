//! Spatial index for fast boundary lookups within one layer.

use geo::{Intersects, Point};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;

use crate::models::Boundary;

/// Wrapper for R-tree indexing of boundaries
#[derive(Clone)]
pub struct IndexedBoundary {
    /// Position in the layer's source order
    pub position: usize,
    pub boundary: Arc<Boundary>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedBoundary {
    pub fn new(position: usize, boundary: Arc<Boundary>) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = boundary.bbox()?;
        Some(Self {
            position,
            boundary,
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

/// R-tree over one layer's boundary envelopes.
///
/// The tree only narrows candidates; every hit is re-checked against the
/// exact geometry. Boundaries with empty geometry are not indexed.
pub struct LayerIndex {
    tree: RTree<IndexedBoundary>,
}

impl LayerIndex {
    /// Build spatial index from boundaries in source order
    pub fn build(boundaries: &[Arc<Boundary>]) -> Self {
        let indexed: Vec<IndexedBoundary> = boundaries
            .iter()
            .enumerate()
            .filter_map(|(i, b)| IndexedBoundary::new(i, Arc::clone(b)))
            .collect();

        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Boundaries whose envelope contains the point (edges included)
    pub fn candidates(&self, lon: f64, lat: f64) -> impl Iterator<Item = &IndexedBoundary> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
    }

    /// Find all boundaries containing a point, in source order.
    ///
    /// Containment is closed-region: a point on an edge or vertex belongs to
    /// every polygon sharing that edge.
    pub fn lookup(&self, point: &Point<f64>) -> Vec<Arc<Boundary>> {
        let mut hits: Vec<&IndexedBoundary> = self
            .candidates(point.x(), point.y())
            .filter(|ib| ib.boundary.geometry.intersects(point))
            .collect();
        hits.sort_by_key(|ib| ib.position);
        hits.into_iter().map(|ib| Arc::clone(&ib.boundary)).collect()
    }

    /// Get total number of indexed boundaries
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> Arc<Boundary> {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ];
        Arc::new(Boundary::new(id, id, MultiPolygon::new(vec![poly])))
    }

    #[test]
    fn test_envelope_hit_is_rechecked() {
        // A triangle whose bbox covers (0.9, 0.9) while the shape does not.
        let triangle = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0)];
        let index = LayerIndex::build(&[Arc::new(Boundary::new(
            "t",
            "t",
            MultiPolygon::new(vec![triangle]),
        ))]);

        assert_eq!(index.candidates(0.9, 0.9).count(), 1);
        assert!(index.lookup(&Point::new(0.9, 0.9)).is_empty());
        assert_eq!(index.lookup(&Point::new(0.2, 0.2)).len(), 1);
    }

    #[test]
    fn test_hits_follow_source_order() {
        let boundaries: Vec<Arc<Boundary>> = (0..20)
            .map(|i| square(&i.to_string(), 0.0, 0.0, 10.0 + i as f64))
            .collect();
        let index = LayerIndex::build(&boundaries);

        let ids: Vec<String> = index
            .lookup(&Point::new(5.0, 5.0))
            .iter()
            .map(|b| b.id.clone())
            .collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_empty_geometry_is_not_indexed() {
        let empty = Arc::new(Boundary::new("e", "e", MultiPolygon::new(vec![])));
        let index = LayerIndex::build(&[empty, square("a", 0.0, 0.0, 1.0)]);
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }
}
