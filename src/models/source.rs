//! Source catalog entry types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::SchemaError;

/// Canonical field every boundary must carry as its identifier.
pub const ID_FIELD: &str = "id";
/// Canonical field every boundary must carry as its label.
pub const NAME_FIELD: &str = "name";

/// Governing level a boundary feed belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JurisdictionScope {
    State,
    County(String),
    City(String),
}

impl FromStr for JurisdictionScope {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("state") {
            return Ok(JurisdictionScope::State);
        }
        match s.split_once(':') {
            Some((kind, name)) if !name.trim().is_empty() => {
                let name = name.trim().to_lowercase();
                match kind.trim().to_ascii_lowercase().as_str() {
                    "county" => Ok(JurisdictionScope::County(name)),
                    "city" => Ok(JurisdictionScope::City(name)),
                    _ => Err(SchemaError::InvalidScope(s.to_string())),
                }
            }
            _ => Err(SchemaError::InvalidScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for JurisdictionScope {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JurisdictionScope> for String {
    fn from(scope: JurisdictionScope) -> Self {
        scope.to_string()
    }
}

impl fmt::Display for JurisdictionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JurisdictionScope::State => f.write_str("state"),
            JurisdictionScope::County(name) => write!(f, "county:{}", name),
            JurisdictionScope::City(name) => write!(f, "city:{}", name),
        }
    }
}

/// Encoding of a boundary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Paged ArcGIS feature-service query returning GeoJSON.
    ArcgisGeojson,
    /// A single complete GeoJSON feature collection.
    Geojson,
    /// A zipped file geodatabase containing named layers.
    FileGeodatabase,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::ArcgisGeojson => "arcgis_geojson",
            SourceFormat::Geojson => "geojson",
            SourceFormat::FileGeodatabase => "file_geodatabase",
        }
    }
}

/// Where the bytes of a feed live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resource {
    Remote(Url),
    Local(PathBuf),
}

impl TryFrom<String> for Resource {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(SchemaError::InvalidLocation(value));
        }
        match Url::parse(&value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Resource::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Resource::Local)
                .map_err(|_| SchemaError::InvalidLocation(value)),
            // Anything else, including a bare relative path, is a local file.
            _ => Ok(Resource::Local(PathBuf::from(value))),
        }
    }
}

impl From<Resource> for String {
    fn from(resource: Resource) -> Self {
        resource.to_string()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Remote(url) => write!(f, "{}", url),
            Resource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resource plus the archive-internal names needed to find a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "url")]
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,
}

/// One source attribute routed to one canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMap {
    pub source: String,
    pub target: String,
}

/// Ordered source → canonical field mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(Vec<FieldMap>);

impl FieldMapping {
    pub fn new<S, T>(pairs: impl IntoIterator<Item = (S, T)>) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(source, target)| FieldMap {
                    source: source.into(),
                    target: target.into(),
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMap> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Source field feeding a canonical target, if any
    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|m| m.target == target)
            .map(|m| m.source.as_str())
    }

    /// Distinct source field names in mapping order (for `outFields`)
    pub fn source_fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.0.len());
        for m in &self.0 {
            if !out.contains(&m.source.as_str()) {
                out.push(&m.source);
            }
        }
        out
    }
}

/// Immutable description of one boundary feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub scope: JurisdictionScope,
    pub boundary_type: String,
    pub format: SourceFormat,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    pub fields: FieldMapping,
}

impl SourceDescriptor {
    pub fn key(&self) -> LayerKey {
        LayerKey {
            scope: self.scope.clone(),
            boundary_type: self.boundary_type.clone(),
        }
    }
}

/// Identity of a spatial layer within a region catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub scope: JurisdictionScope,
    pub boundary_type: String,
}

impl LayerKey {
    pub fn new(scope: JurisdictionScope, boundary_type: impl Into<String>) -> Self {
        Self {
            scope,
            boundary_type: boundary_type.into(),
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.boundary_type)
    }
}
