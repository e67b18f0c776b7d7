//! Shared catalog handle with atomic reload.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::{LookupResult, RegionCatalog};
use crate::error::LookupError;

/// Point lookups against whichever catalog is current.
///
/// Readers clone the inner `Arc` and query it without holding the lock, so a
/// lookup always sees one whole catalog, old or new, even across a swap.
#[derive(Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<RegionCatalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: RegionCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// The catalog lookups currently run against
    pub fn snapshot(&self) -> Arc<RegionCatalog> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replace the catalog, returning the previous one
    pub fn swap(&self, catalog: RegionCatalog) -> Arc<RegionCatalog> {
        let next = Arc::new(catalog);
        info!(
            "Swapping in catalog with {} layers ({} boundaries)",
            next.len(),
            next.boundary_count()
        );
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    pub fn lookup(&self, lon: f64, lat: f64) -> Result<LookupResult, LookupError> {
        self.snapshot().lookup(lon, lat)
    }

    pub fn lookup_scoped(
        &self,
        lon: f64,
        lat: f64,
        boundary_types: &[&str],
    ) -> Result<LookupResult, LookupError> {
        self.snapshot().lookup_scoped(lon, lat, boundary_types)
    }
}
