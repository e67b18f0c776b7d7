//! In-memory transport for tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use super::Transport;
use crate::error::FetchError;

/// Serves canned bodies keyed by URL path and `resultOffset`.
#[derive(Default)]
pub struct MockTransport {
    pages: HashMap<(String, usize), Vec<u8>>,
    counts: HashMap<String, usize>,
    requests: Mutex<Vec<(String, usize)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, offset: usize, body: Vec<u8>) -> Self {
        self.pages.insert((path_of(url), offset), body);
        self
    }

    pub fn with_count(mut self, url: &str, count: usize) -> Self {
        self.counts.insert(path_of(url), count);
        self
    }

    /// Requested (path, offset) pairs in request order
    pub fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

fn path_of(url: &str) -> String {
    Url::parse(url).unwrap().path().to_string()
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url, query: &[(String, String)]) -> Result<Vec<u8>, FetchError> {
        let param = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let path = url.path().to_string();

        if param("returnCountOnly").as_deref() == Some("true") {
            let count = self.counts.get(&path).ok_or(FetchError::Status {
                url: url.to_string(),
                status: 400,
            })?;
            return Ok(json!({ "count": count }).to_string().into_bytes());
        }

        let offset = param("resultOffset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.requests.lock().unwrap().push((path.clone(), offset));

        self.pages
            .get(&(path, offset))
            .cloned()
            .ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Feature collection of axis-aligned squares `(id, name, [min_x, min_y, max_x, max_y])`
pub fn squares(features: &[(i64, &str, [f64; 4])], exceeded: bool) -> Vec<u8> {
    let features: Vec<_> = features
        .iter()
        .map(|(id, name, [x0, y0, x1, y1])| {
            json!({
                "type": "Feature",
                "properties": { "OBJECTID": id, "NAME": name },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
        "properties": { "exceededTransferLimit": exceeded }
    })
    .to_string()
    .into_bytes()
}
