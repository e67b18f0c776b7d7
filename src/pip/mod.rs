//! Point-in-polygon lookups over normalized boundary layers.
//!
//! Each [`SpatialLayer`] keeps an R-tree of boundary envelopes as a
//! pre-filter; every candidate is re-checked with an exact, edge-inclusive
//! containment test.

mod catalog;
mod index;
mod layer;
mod service;

pub use catalog::{LookupResult, RegionCatalog};
pub use index::{IndexedBoundary, LayerIndex};
pub use layer::SpatialLayer;
pub use service::CatalogHandle;
