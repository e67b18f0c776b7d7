//! Error taxonomy for catalog loading and lookups.

use thiserror::Error;

use crate::models::LayerKey;

/// A source descriptor (or the catalog document holding it) is invalid.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse source catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("field mapping is empty")]
    EmptyMapping,

    #[error("field mapping has no source field for required canonical field '{0}'")]
    MissingTarget(&'static str),

    #[error("canonical field '{0}' is targeted more than once")]
    DuplicateTarget(String),

    #[error("canonical field name must not be empty (source field '{0}')")]
    EmptyTarget(String),

    #[error("format '{format}' requires '{field}'")]
    MissingLocationField {
        format: &'static str,
        field: &'static str,
    },

    #[error("invalid jurisdiction scope '{0}' (expected state, county:<name> or city:<name>)")]
    InvalidScope(String),

    #[error("invalid location '{0}'")]
    InvalidLocation(String),
}

/// Retrieving a raw layer failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response envelope: {0}")]
    Malformed(String),

    #[error("feature service reported an error: {0}")]
    Service(String),

    #[error("unsupported geometry type '{0}'")]
    UnsupportedGeometry(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("layer '{layer}' not found in archive folder '{folder}'")]
    LayerNotFound { folder: String, layer: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch aborted")]
    Aborted,
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

impl From<zip::result::ZipError> for FetchError {
    fn from(e: zip::result::ZipError) -> Self {
        FetchError::Archive(e.to_string())
    }
}

/// A raw layer could not be turned into a trusted spatial layer.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("feature {index}: required field '{canonical}' (source '{source_field}') is missing")]
    MissingField {
        index: usize,
        canonical: String,
        source_field: String,
    },

    #[error("feature {index} has no geometry")]
    MissingGeometry { index: usize },

    #[error("duplicate boundary id '{0}'")]
    DuplicateId(String),

    #[error("unsupported coordinate reference system '{0}'")]
    UnsupportedCrs(String),
}

/// Cache storage failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("cache entry encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Why a single layer failed to load.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("normalization task failed: {0}")]
    Task(String),
}

/// A lookup could not be answered.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("catalog has no loaded layers")]
    EmptyCatalog,

    #[error("coordinate ({lon}, {lat}) is not a valid WGS84 longitude/latitude")]
    InvalidCoordinate { lon: f64, lat: f64 },

    #[error("unknown boundary type '{0}'")]
    UnknownBoundaryType(String),
}

/// Loading could not start at all.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("layer {key} failed: {source}")]
    Layer {
        key: LayerKey,
        #[source]
        source: LayerError,
    },
}
