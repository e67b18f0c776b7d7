//! Paged ArcGIS feature-service queries.
//!
//! Services cap the number of features per response. The pager keeps
//! advancing `resultOffset` while the service reports `exceededTransferLimit`
//! or returns a full page. When parallel pages are enabled and the service
//! answers a count-only query, every offset is known upfront and pages are
//! fetched concurrently, then concatenated in offset order. A page the
//! service capped below the requested size is continued from where it
//! stopped, so every reported record is fetched exactly once.

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::geojson::{decode_count, decode_page, Page};
use super::raw::{RawFeature, RawFeatureCollection};
use super::transport::{with_retry, Transport};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::FieldMapping;

pub struct ArcGisPager<'a> {
    transport: &'a dyn Transport,
    config: &'a FetchConfig,
    cancel: &'a CancellationToken,
}

impl<'a> ArcGisPager<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        config: &'a FetchConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            cancel,
        }
    }

    /// Fetch every feature the service holds for `url`
    pub async fn fetch_all(
        &self,
        url: &Url,
        fields: &FieldMapping,
    ) -> Result<RawFeatureCollection, FetchError> {
        let base = query_params(fields);

        if let (true, Some(page_size)) = (self.config.parallel_pages, self.config.page_size) {
            match self.count(url, &base).await {
                Ok(total) => return self.fetch_parallel(url, &base, total, page_size).await,
                Err(e) => warn!(
                    "Count query against {} failed ({}); paging sequentially",
                    url, e
                ),
            }
        }

        self.fetch_sequential(url, &base).await
    }

    async fn fetch_sequential(
        &self,
        url: &Url,
        base: &[(String, String)],
    ) -> Result<RawFeatureCollection, FetchError> {
        let mut collection = RawFeatureCollection::default();
        let mut crs = None;
        let mut offset = 0;
        let mut pages = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Aborted);
            }

            let page = self.page(url, base, offset).await?;
            pages += 1;

            let count = page.features.len();
            let full_page = self.config.page_size.is_some_and(|cap| count >= cap);
            let more = count > 0 && (page.exceeded || full_page);

            debug!(
                "{}: page {} at offset {} returned {} features (more: {})",
                url, pages, offset, count, more
            );

            if crs.is_none() {
                crs = page.crs;
            }
            collection.features.extend(page.features);

            if !more {
                break;
            }
            offset += count;
        }

        collection.crs = crs.unwrap_or_default();
        info!(
            "Fetched {} features from {} in {} pages",
            collection.len(),
            url,
            pages
        );
        Ok(collection)
    }

    async fn fetch_parallel(
        &self,
        url: &Url,
        base: &[(String, String)],
        total: usize,
        page_size: usize,
    ) -> Result<RawFeatureCollection, FetchError> {
        let page_size = page_size.max(1);
        let offsets: Vec<usize> = (0..total).step_by(page_size).collect();
        info!(
            "{}: {} features reported, fetching {} pages concurrently",
            url,
            total,
            offsets.len()
        );

        let pages: Vec<(usize, Page)> = stream::iter(offsets)
            .map(|offset| async move {
                if self.cancel.is_cancelled() {
                    return Err(FetchError::Aborted);
                }
                self.page(url, base, offset).await.map(|page| (offset, page))
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let mut collection = RawFeatureCollection::default();
        let mut crs = None;
        for (offset, page) in pages {
            if crs.is_none() {
                crs = page.crs;
            }
            let span = page_size.min(total - offset);
            let features = self.fill_span(url, base, offset, span, page.features).await?;
            collection.features.extend(features);
        }
        collection.crs = crs.unwrap_or_default();
        Ok(collection)
    }

    /// Complete the `span` records starting at `offset` when the service
    /// capped the page below the requested size.
    async fn fill_span(
        &self,
        url: &Url,
        base: &[(String, String)],
        offset: usize,
        span: usize,
        mut features: Vec<RawFeature>,
    ) -> Result<Vec<RawFeature>, FetchError> {
        features.truncate(span);
        while features.len() < span {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Aborted);
            }
            let next = offset + features.len();
            debug!(
                "{}: page at offset {} held {} of {} features, continuing at {}",
                url,
                offset,
                features.len(),
                span,
                next
            );

            let mut page = self.page(url, base, next).await?;
            if page.features.is_empty() {
                return Err(FetchError::Malformed(format!(
                    "{} ran out of features at offset {} before reaching {}",
                    url,
                    next,
                    offset + span
                )));
            }
            page.features.truncate(span - features.len());
            features.extend(page.features);
        }
        Ok(features)
    }

    async fn page(
        &self,
        url: &Url,
        base: &[(String, String)],
        offset: usize,
    ) -> Result<Page, FetchError> {
        let mut params = base.to_vec();
        params.push(("resultOffset".to_string(), offset.to_string()));
        if let Some(page_size) = self.config.page_size {
            params.push(("resultRecordCount".to_string(), page_size.to_string()));
        }

        let what = format!("{} (offset {})", url, offset);
        let transport = self.transport;
        let params = &params;
        with_retry(&what, self.config.max_retries, self.config.backoff(), || async move {
            let body = transport.get(url, params).await?;
            decode_page(&body)
        })
        .await
    }

    async fn count(&self, url: &Url, base: &[(String, String)]) -> Result<usize, FetchError> {
        let mut params: Vec<(String, String)> = base
            .iter()
            .filter(|(k, _)| k != "f")
            .cloned()
            .collect();
        params.push(("returnCountOnly".to_string(), "true".to_string()));
        params.push(("f".to_string(), "json".to_string()));

        let what = format!("{} (count)", url);
        let transport = self.transport;
        let params = &params;
        with_retry(&what, self.config.max_retries, self.config.backoff(), || async move {
            let body = transport.get(url, params).await?;
            decode_count(&body)
        })
        .await
    }
}

/// Query parameters shared by every page request
fn query_params(fields: &FieldMapping) -> Vec<(String, String)> {
    let out_fields = fields.source_fields().join(",");
    [
        ("where", "1=1"),
        ("outFields", out_fields.as_str()),
        ("returnGeometry", "true"),
        ("returnTrueCurves", "false"),
        ("returnZ", "false"),
        ("returnM", "false"),
        ("outSR", "4326"),
        ("returnExceededLimitFeatures", "true"),
        ("f", "geojson"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
