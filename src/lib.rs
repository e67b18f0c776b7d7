//! Precinct Lookup - resolve a point to every administrative boundary containing it
//!
//! Boundary feeds are described in a declarative source catalog, fetched
//! from heterogeneous upstreams (paged ArcGIS services, GeoJSON files,
//! zipped file geodatabases), normalized onto canonical fields and indexed
//! per boundary type for point-in-polygon lookups.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod load;
pub mod models;
pub mod normalize;
pub mod pip;
pub mod registry;

pub use error::{FetchError, LayerError, LoadError, LookupError, NormalizationError, SchemaError};
pub use load::{LoadOutcome, LoadReport, Loader};
pub use models::{Boundary, JurisdictionScope, SourceDescriptor};
pub use pip::{CatalogHandle, LookupResult, RegionCatalog, SpatialLayer};
pub use registry::SourceRegistry;
