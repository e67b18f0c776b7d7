//! On-disk cache of fetched raw layers.
//!
//! Entries live in a sled tree:
//! - `layer/<fingerprint>`: one raw feature collection, JSON encoded
//! - `scope/<scope>`: manifest with the fetch time and the fingerprints
//!   stored together for that scope
//!
//! A scope is served from cache only as a whole. A stale manifest, a
//! changed descriptor or a missing entry invalidates the entire scope.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

use crate::error::CacheError;
use crate::fetch::RawFeatureCollection;
use crate::models::{JurisdictionScope, SourceDescriptor};

#[derive(Debug, Serialize, Deserialize)]
struct ScopeManifest {
    fetched_at: DateTime<Utc>,
    fingerprints: Vec<String>,
}

/// Identity of a descriptor: any change to its location, format or mapping
/// yields a different fingerprint.
pub fn fingerprint(descriptor: &SourceDescriptor) -> Result<String, CacheError> {
    let encoded = serde_json::to_vec(descriptor)?;
    Ok(format!("{:016x}", xxh64(&encoded, 0)))
}

pub struct LayerCache {
    db: sled::Db,
    max_age: Duration,
}

impl LayerCache {
    pub fn open<P: AsRef<Path>>(dir: P, max_age: Duration) -> Result<Self, CacheError> {
        let db = sled::open(dir.as_ref())?;
        debug!("Opened layer cache at {}", dir.as_ref().display());
        Ok(Self { db, max_age })
    }

    /// Cached raw layers for every descriptor of `scope`, in the given order
    pub fn load_scope(
        &self,
        scope: &JurisdictionScope,
        descriptors: &[&SourceDescriptor],
    ) -> Result<Option<Vec<RawFeatureCollection>>, CacheError> {
        self.load_scope_at(scope, descriptors, Utc::now())
    }

    pub fn load_scope_at(
        &self,
        scope: &JurisdictionScope,
        descriptors: &[&SourceDescriptor],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RawFeatureCollection>>, CacheError> {
        let Some(bytes) = self.db.get(scope_key(scope))? else {
            return Ok(None);
        };
        let manifest: ScopeManifest = serde_json::from_slice(&bytes)?;

        if now - manifest.fetched_at > self.max_age {
            info!(
                "Cache for {} is stale (fetched {}); invalidating",
                scope, manifest.fetched_at
            );
            self.invalidate_scope(scope)?;
            return Ok(None);
        }

        let wanted = descriptors
            .iter()
            .map(|d| fingerprint(d))
            .collect::<Result<Vec<_>, _>>()?;
        if sorted(&wanted) != sorted(&manifest.fingerprints) {
            info!("Sources for {} changed since caching; invalidating", scope);
            self.invalidate_scope(scope)?;
            return Ok(None);
        }

        let mut layers = Vec::with_capacity(wanted.len());
        for fp in &wanted {
            match self.db.get(layer_key(fp))? {
                Some(bytes) => layers.push(serde_json::from_slice(&bytes)?),
                None => {
                    warn!("Cache for {} is missing layer {}; invalidating", scope, fp);
                    self.invalidate_scope(scope)?;
                    return Ok(None);
                }
            }
        }

        debug!("Cache hit for {} ({} layers)", scope, layers.len());
        Ok(Some(layers))
    }

    /// Store every raw layer of `scope` at once, replacing any previous entry
    pub fn store_scope(
        &self,
        scope: &JurisdictionScope,
        layers: &[(&SourceDescriptor, &RawFeatureCollection)],
    ) -> Result<(), CacheError> {
        self.store_scope_at(scope, layers, Utc::now())
    }

    pub fn store_scope_at(
        &self,
        scope: &JurisdictionScope,
        layers: &[(&SourceDescriptor, &RawFeatureCollection)],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.invalidate_scope(scope)?;

        let mut batch = sled::Batch::default();
        let mut fingerprints = Vec::with_capacity(layers.len());
        for (descriptor, raw) in layers {
            let fp = fingerprint(descriptor)?;
            batch.insert(layer_key(&fp).as_bytes(), serde_json::to_vec(raw)?);
            fingerprints.push(fp);
        }
        let manifest = ScopeManifest {
            fetched_at,
            fingerprints,
        };
        batch.insert(scope_key(scope).as_bytes(), serde_json::to_vec(&manifest)?);

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        info!("Cached {} layers for {}", layers.len(), scope);
        Ok(())
    }

    /// Drop the manifest and every layer it lists
    pub fn invalidate_scope(&self, scope: &JurisdictionScope) -> Result<(), CacheError> {
        let Some(bytes) = self.db.remove(scope_key(scope))? else {
            return Ok(());
        };
        // A corrupt manifest still gets removed; its layers become orphans.
        if let Ok(manifest) = serde_json::from_slice::<ScopeManifest>(&bytes) {
            for fp in &manifest.fingerprints {
                self.db.remove(layer_key(fp))?;
            }
        }
        self.db.flush()?;
        Ok(())
    }
}

fn scope_key(scope: &JurisdictionScope) -> String {
    format!("scope/{}", scope)
}

fn layer_key(fingerprint: &str) -> String {
    format!("layer/{}", fingerprint)
}

fn sorted(values: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = values.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RawFeature;
    use crate::models::{FieldMapping, Location, Resource, SourceFormat};
    use geo::{polygon, MultiPolygon};

    fn descriptor(boundary_type: &str, url: &str) -> SourceDescriptor {
        SourceDescriptor {
            scope: JurisdictionScope::County("king".to_string()),
            boundary_type: boundary_type.to_string(),
            format: SourceFormat::Geojson,
            location: Location {
                resource: Resource::try_from(url.to_string()).unwrap(),
                folder_name: None,
                layer_name: None,
            },
            display_name: None,
            display_url: None,
            fields: FieldMapping::new([("ID", "id"), ("NAME", "name")]),
        }
    }

    fn raw(name: &str) -> RawFeatureCollection {
        let mut attributes = serde_json::Map::new();
        attributes.insert("NAME".to_string(), serde_json::Value::from(name));
        RawFeatureCollection {
            features: vec![RawFeature {
                attributes,
                geometry: Some(MultiPolygon::new(vec![polygon![
                    (x: 0.0, y: 0.0),
                    (x: 1.0, y: 0.0),
                    (x: 1.0, y: 1.0),
                ]])),
            }],
            ..Default::default()
        }
    }

    fn scope() -> JurisdictionScope {
        JurisdictionScope::County("king".to_string())
    }

    #[test]
    fn test_round_trip_scope() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
        let a = descriptor("council", "https://example.com/a.geojson");
        let b = descriptor("court", "https://example.com/b.geojson");
        let (raw_a, raw_b) = (raw("a"), raw("b"));

        cache.store_scope(&scope(), &[(&a, &raw_a), (&b, &raw_b)]).unwrap();

        // Requested order wins over stored order
        let loaded = cache.load_scope(&scope(), &[&b, &a]).unwrap().unwrap();
        assert_eq!(loaded, vec![raw_b, raw_a]);
    }

    #[test]
    fn test_stale_scope_is_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
        let a = descriptor("council", "https://example.com/a.geojson");
        let fetched = Utc::now() - Duration::hours(2);

        cache.store_scope_at(&scope(), &[(&a, &raw("a"))], fetched).unwrap();

        assert!(cache.load_scope(&scope(), &[&a]).unwrap().is_none());
        // Invalidation removed the entry, so even a lenient clock misses now
        assert!(cache.load_scope_at(&scope(), &[&a], fetched).unwrap().is_none());
    }

    #[test]
    fn test_changed_descriptor_misses_whole_scope() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
        let a = descriptor("council", "https://example.com/a.geojson");
        let b = descriptor("court", "https://example.com/b.geojson");
        cache.store_scope(&scope(), &[(&a, &raw("a")), (&b, &raw("b"))]).unwrap();

        let moved = descriptor("court", "https://example.com/b-v2.geojson");
        assert!(cache.load_scope(&scope(), &[&a, &moved]).unwrap().is_none());
        // Partial reuse never happens: `a` alone is gone too
        assert!(cache.load_scope(&scope(), &[&a, &b]).unwrap().is_none());
    }

    #[test]
    fn test_missing_layer_entry_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
        let a = descriptor("council", "https://example.com/a.geojson");
        cache.store_scope(&scope(), &[(&a, &raw("a"))]).unwrap();

        let fp = fingerprint(&a).unwrap();
        cache.db.remove(layer_key(&fp)).unwrap();

        assert!(cache.load_scope(&scope(), &[&a]).unwrap().is_none());
        assert!(cache.db.get(scope_key(&scope())).unwrap().is_none());
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = descriptor("council", "https://example.com/a.geojson");
        {
            let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
            cache.store_scope(&scope(), &[(&a, &raw("a"))]).unwrap();
        }
        let cache = LayerCache::open(dir.path(), Duration::hours(1)).unwrap();
        assert_eq!(cache.load_scope(&scope(), &[&a]).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_fingerprint_tracks_mapping() {
        let a = descriptor("council", "https://example.com/a.geojson");
        let mut remapped = a.clone();
        remapped.fields = FieldMapping::new([("ID", "id"), ("LABEL", "name")]);

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&a.clone()).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&remapped).unwrap());
    }
}
