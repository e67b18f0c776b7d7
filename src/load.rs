//! Catalog loading: validate, fetch (or reuse cache), normalize, assemble.
//!
//! Layers are independent, so they are fetched and normalized concurrently
//! up to `fetch.concurrency` at a time. One layer failing never aborts the
//! others; every outcome lands in the [`LoadReport`].

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::LayerCache;
use crate::config::{Config, NormalizeConfig};
use crate::error::{LayerError, LoadError};
use crate::fetch::{Fetcher, RawFeatureCollection, Transport};
use crate::models::{JurisdictionScope, LayerKey, SourceDescriptor};
use crate::normalize::normalize;
use crate::pip::{RegionCatalog, SpatialLayer};
use crate::registry::{validate, SourceRegistry};

/// Where a loaded layer's raw features came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOrigin {
    Fetched,
    Cache,
}

#[derive(Debug)]
pub enum LayerStatus {
    Loaded {
        boundaries: usize,
        origin: LayerOrigin,
    },
    Failed(LayerError),
}

#[derive(Debug)]
pub struct LayerReport {
    pub key: LayerKey,
    pub status: LayerStatus,
}

impl LayerReport {
    pub fn is_loaded(&self) -> bool {
        matches!(self.status, LayerStatus::Loaded { .. })
    }
}

/// Per-layer outcome of one load, ordered by layer key.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub layers: Vec<LayerReport>,
}

impl LoadReport {
    /// True when every requested layer loaded
    pub fn is_complete(&self) -> bool {
        self.layers.iter().all(LayerReport::is_loaded)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&LayerKey, &LayerError)> {
        self.layers.iter().filter_map(|r| match &r.status {
            LayerStatus::Failed(e) => Some((&r.key, e)),
            LayerStatus::Loaded { .. } => None,
        })
    }

    pub fn loaded(&self) -> usize {
        self.layers.iter().filter(|r| r.is_loaded()).count()
    }
}

pub struct LoadOutcome {
    /// Every layer that loaded successfully
    pub catalog: RegionCatalog,
    pub report: LoadReport,
}

impl LoadOutcome {
    /// The catalog, or the first failed layer's error
    pub fn into_strict(self) -> Result<RegionCatalog, LoadError> {
        let failure = self
            .report
            .layers
            .into_iter()
            .find_map(|r| match r.status {
                LayerStatus::Failed(source) => Some((r.key, source)),
                LayerStatus::Loaded { .. } => None,
            });
        match failure {
            Some((key, source)) => Err(LoadError::Layer { key, source }),
            None => Ok(self.catalog),
        }
    }
}

/// A freshly fetched raw layer awaiting the cache
type FreshLayer<'a> = (&'a SourceDescriptor, RawFeatureCollection);

struct LoadedLayer {
    layer: SpatialLayer,
    /// Kept for the cache when the layer was freshly fetched
    raw: Option<RawFeatureCollection>,
}

/// Builds region catalogs from a source registry.
pub struct Loader {
    fetcher: Fetcher,
    cache: Option<LayerCache>,
    normalize: NormalizeConfig,
    concurrency: usize,
    refresh: bool,
}

impl Loader {
    /// Loader fetching over HTTP
    pub fn new(config: &Config) -> Result<Self, LoadError> {
        let fetcher = Fetcher::http(config.fetch.clone())?;
        Self::with_fetcher(fetcher, config)
    }

    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, LoadError> {
        Self::with_fetcher(Fetcher::new(transport, config.fetch.clone()), config)
    }

    pub fn with_fetcher(fetcher: Fetcher, config: &Config) -> Result<Self, LoadError> {
        let cache = if config.cache.enabled {
            Some(LayerCache::open(&config.cache.dir, config.cache.max_age())?)
        } else {
            None
        };

        Ok(Self {
            fetcher,
            cache,
            normalize: config.normalize.clone(),
            concurrency: config.fetch.concurrency.max(1),
            refresh: false,
        })
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Ignore cached layers (fresh results are still cached)
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Cancelling stops new page requests; in-flight ones finish or time out
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.fetcher.cancellation_token()
    }

    /// Load every layer of `scope`, failing if any layer fails
    pub async fn load_catalog(
        &self,
        registry: &SourceRegistry,
        scope: &JurisdictionScope,
    ) -> Result<RegionCatalog, LoadError> {
        self.load(registry, std::slice::from_ref(scope))
            .await
            .into_strict()
    }

    /// Load every layer of the given scopes, keeping whatever succeeds
    pub async fn load(
        &self,
        registry: &SourceRegistry,
        scopes: &[JurisdictionScope],
    ) -> LoadOutcome {
        let mut reports = Vec::new();
        let mut jobs: Vec<(&SourceDescriptor, Option<RawFeatureCollection>)> = Vec::new();

        let mut seen = BTreeSet::new();
        for scope in scopes {
            if !seen.insert(scope) {
                continue;
            }

            let descriptors = registry.all_descriptors(scope);
            if descriptors.is_empty() {
                warn!("No sources registered for {} in {}", scope, registry.state());
                continue;
            }

            let mut valid = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                match validate(descriptor) {
                    Ok(()) => valid.push(descriptor),
                    Err(e) => {
                        warn!("Skipping {}: {}", descriptor.key(), e);
                        reports.push(LayerReport {
                            key: descriptor.key(),
                            status: LayerStatus::Failed(e.into()),
                        });
                    }
                }
            }

            match self.cached_scope(scope, &valid) {
                Some(raws) => jobs.extend(valid.into_iter().zip(raws.into_iter().map(Some))),
                None => jobs.extend(valid.into_iter().map(|d| (d, None))),
            }
        }

        info!("Loading {} layers ({} at a time)", jobs.len(), self.concurrency);

        let results: Vec<(&SourceDescriptor, bool, Result<LoadedLayer, LayerError>)> =
            stream::iter(jobs)
                .map(|(descriptor, cached)| async move {
                    let from_cache = cached.is_some();
                    (descriptor, from_cache, self.load_layer(descriptor, cached).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut layers = Vec::new();
        let mut fresh: BTreeMap<&JurisdictionScope, Vec<FreshLayer>> = BTreeMap::new();
        let mut incomplete = BTreeSet::new();

        for (descriptor, from_cache, result) in results {
            let key = descriptor.key();
            match result {
                Ok(loaded) => {
                    let origin = if from_cache {
                        LayerOrigin::Cache
                    } else {
                        LayerOrigin::Fetched
                    };
                    reports.push(LayerReport {
                        key,
                        status: LayerStatus::Loaded {
                            boundaries: loaded.layer.len(),
                            origin,
                        },
                    });
                    if let Some(raw) = loaded.raw {
                        fresh.entry(&descriptor.scope).or_default().push((descriptor, raw));
                    }
                    layers.push(loaded.layer);
                }
                Err(e) => {
                    error!("Layer {} failed: {}", key, e);
                    if from_cache {
                        self.invalidate(&descriptor.scope);
                    }
                    incomplete.insert(&descriptor.scope);
                    reports.push(LayerReport {
                        key,
                        status: LayerStatus::Failed(e),
                    });
                }
            }
        }

        for (scope, entries) in &fresh {
            if !incomplete.contains(scope) {
                self.store(scope, entries);
            }
        }

        reports.sort_by(|a, b| a.key.cmp(&b.key));
        let report = LoadReport { layers: reports };
        info!(
            "Loaded {} of {} layers",
            report.loaded(),
            report.layers.len()
        );

        let failed: Vec<LayerKey> = report.failures().map(|(key, _)| key.clone()).collect();
        LoadOutcome {
            catalog: RegionCatalog::new(layers).with_unavailable(failed),
            report,
        }
    }

    async fn load_layer(
        &self,
        descriptor: &SourceDescriptor,
        cached: Option<RawFeatureCollection>,
    ) -> Result<LoadedLayer, LayerError> {
        let (raw, keep) = match cached {
            Some(raw) => (raw, None),
            None => {
                let raw = self.fetcher.fetch(descriptor).await?;
                let keep = self.cache.is_some().then(|| raw.clone());
                (raw, keep)
            }
        };

        let descriptor = descriptor.clone();
        let config = self.normalize.clone();
        let layer = tokio::task::spawn_blocking(move || normalize(raw, &descriptor, &config))
            .await
            .map_err(|e| LayerError::Task(e.to_string()))??;

        Ok(LoadedLayer { layer, raw: keep })
    }

    fn cached_scope(
        &self,
        scope: &JurisdictionScope,
        descriptors: &[&SourceDescriptor],
    ) -> Option<Vec<RawFeatureCollection>> {
        let cache = self.cache.as_ref()?;
        if self.refresh || descriptors.is_empty() {
            return None;
        }
        match cache.load_scope(scope, descriptors) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache read for {} failed: {}", scope, e);
                None
            }
        }
    }

    fn store(&self, scope: &JurisdictionScope, entries: &[FreshLayer]) {
        let Some(cache) = &self.cache else {
            return;
        };
        let refs: Vec<(&SourceDescriptor, &RawFeatureCollection)> =
            entries.iter().map(|(d, raw)| (*d, raw)).collect();
        if let Err(e) = cache.store_scope(scope, &refs) {
            warn!("Failed to cache {}: {}", scope, e);
        }
    }

    fn invalidate(&self, scope: &JurisdictionScope) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_scope(scope) {
                warn!("Failed to invalidate cache for {}: {}", scope, e);
            }
        }
    }
}
