//! Layer fetcher: turns a source descriptor into raw features.
//!
//! Dispatch is a single match over [`SourceFormat`]:
//! - `arcgis_geojson`: paged feature-service queries ([`ArcGisPager`])
//! - `geojson`: one download, one feature collection
//! - `file_geodatabase`: archive download, extraction and layer lookup
//!
//! No attribute renaming or reprojection happens here.

mod arcgis;
mod archive;
mod geojson;
mod raw;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use arcgis::ArcGisPager;
pub use archive::{open_archive_layer, GeoJsonExportOpener, LayerOpener};
pub use geojson::{decode_count, decode_page, Page};
pub use raw::{RawFeature, RawFeatureCollection};
pub use transport::{with_retry, HttpTransport, Transport};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::{Resource, SourceDescriptor, SourceFormat};

/// Retrieves raw layers over a shared transport.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    opener: Arc<dyn LayerOpener>,
    config: FetchConfig,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: FetchConfig) -> Self {
        Self {
            transport,
            opener: Arc::new(GeoJsonExportOpener),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Fetcher over a reqwest client built from `config`
    pub fn http(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn with_layer_opener(mut self, opener: Arc<dyn LayerOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Share an abort signal; once cancelled no new requests are issued
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<RawFeatureCollection, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Aborted);
        }

        info!(
            "Fetching {} ({}) from {}",
            descriptor.key(),
            descriptor.format.as_str(),
            descriptor.location.resource
        );

        match descriptor.format {
            SourceFormat::ArcgisGeojson => match &descriptor.location.resource {
                Resource::Remote(url) => {
                    ArcGisPager::new(self.transport.as_ref(), &self.config, &self.cancel)
                        .fetch_all(url, &descriptor.fields)
                        .await
                }
                // A local export of a feature service is a single page
                Resource::Local(_) => self.fetch_geojson(&descriptor.location.resource).await,
            },
            SourceFormat::Geojson => self.fetch_geojson(&descriptor.location.resource).await,
            SourceFormat::FileGeodatabase => {
                let layer = descriptor.location.layer_name.clone().ok_or_else(|| {
                    FetchError::Archive("file geodatabase source without layer_name".to_string())
                })?;
                let folder = descriptor.location.folder_name.clone();
                let bytes = self.download(&descriptor.location.resource).await?;
                let opener = Arc::clone(&self.opener);

                tokio::task::spawn_blocking(move || {
                    open_archive_layer(&bytes, folder.as_deref(), &layer, opener.as_ref())
                })
                .await
                .map_err(|e| FetchError::Archive(format!("extraction task failed: {}", e)))?
            }
        }
    }

    async fn fetch_geojson(&self, resource: &Resource) -> Result<RawFeatureCollection, FetchError> {
        let body = self.download(resource).await?;
        let page = decode_page(&body)?;
        info!("Fetched {} features from {}", page.features.len(), resource);
        Ok(RawFeatureCollection {
            features: page.features,
            crs: page.crs.unwrap_or_default(),
        })
    }

    async fn download(&self, resource: &Resource) -> Result<Vec<u8>, FetchError> {
        match resource {
            Resource::Local(path) => Ok(tokio::fs::read(path).await?),
            Resource::Remote(url) => {
                let transport = self.transport.as_ref();
                with_retry(
                    url.as_str(),
                    self.config.max_retries,
                    self.config.backoff(),
                    || async move { transport.get(url, &[]).await },
                )
                .await
            }
        }
    }
}
