//! GeoJSON feature-collection envelopes, including the ArcGIS flavour.
//!
//! ArcGIS feature services answer `f=geojson` queries with a regular feature
//! collection plus an `exceededTransferLimit` flag (either top-level or under
//! `properties`), or with an `{"error": {...}}` body and HTTP 200.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::raw::RawFeature;
use crate::error::FetchError;
use crate::normalize::Crs;

#[derive(Debug, Deserialize)]
struct Envelope {
    features: Option<Vec<FeatureJson>>,
    properties: Option<EnvelopeProperties>,
    #[serde(rename = "exceededTransferLimit")]
    exceeded_transfer_limit: Option<bool>,
    error: Option<ServiceError>,
    crs: Option<CrsJson>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeProperties {
    #[serde(rename = "exceededTransferLimit")]
    exceeded_transfer_limit: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    code: Option<i64>,
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CrsJson {
    properties: Option<CrsProperties>,
}

#[derive(Debug, Deserialize)]
struct CrsProperties {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeatureJson {
    properties: Option<Map<String, Value>>,
    geometry: Option<GeometryJson>,
}

#[derive(Debug, Deserialize)]
struct GeometryJson {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Count-only response of a feature service
#[derive(Debug, Deserialize)]
struct CountEnvelope {
    count: Option<usize>,
    error: Option<ServiceError>,
}

/// One decoded response body.
#[derive(Debug)]
pub struct Page {
    pub features: Vec<RawFeature>,
    /// The service signalled that more records exist past this page
    pub exceeded: bool,
    pub crs: Option<Crs>,
}

/// Decode a feature collection body.
pub fn decode_page(body: &[u8]) -> Result<Page, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body)?;

    if let Some(error) = envelope.error {
        return Err(service_error(error));
    }

    let features = envelope
        .features
        .ok_or_else(|| FetchError::Malformed("missing 'features' member".to_string()))?
        .into_iter()
        .map(|f| {
            Ok(RawFeature {
                attributes: f.properties.unwrap_or_default(),
                geometry: f.geometry.map(to_multipolygon).transpose()?,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    let exceeded = envelope
        .properties
        .and_then(|p| p.exceeded_transfer_limit)
        .or(envelope.exceeded_transfer_limit)
        .unwrap_or(false);

    let crs = envelope
        .crs
        .and_then(|c| c.properties)
        .and_then(|p| p.name)
        .map(|name| Crs::from_name(&name));

    Ok(Page {
        features,
        exceeded,
        crs,
    })
}

/// Decode a `returnCountOnly=true` response.
pub fn decode_count(body: &[u8]) -> Result<usize, FetchError> {
    let envelope: CountEnvelope = serde_json::from_slice(body)?;
    if let Some(error) = envelope.error {
        return Err(service_error(error));
    }
    envelope
        .count
        .ok_or_else(|| FetchError::Malformed("missing 'count' member".to_string()))
}

fn service_error(error: ServiceError) -> FetchError {
    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    if let Some(code) = error.code {
        message = format!("{} (code {})", message, code);
    }
    if !error.details.is_empty() {
        message = format!("{}: {}", message, error.details.join("; "));
    }
    FetchError::Service(message)
}

fn to_multipolygon(geometry: GeometryJson) -> Result<MultiPolygon<f64>, FetchError> {
    match geometry.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(geometry.coordinates)?;
            Ok(MultiPolygon::new(vec![to_polygon(rings)?]))
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> = serde_json::from_value(geometry.coordinates)?;
            let polygons = polygons
                .into_iter()
                .map(to_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(FetchError::UnsupportedGeometry(other.to_string())),
    }
}

fn to_polygon(rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>, FetchError> {
    let mut rings = rings.into_iter().map(to_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| FetchError::Malformed("polygon without rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_ring(points: Vec<Vec<f64>>) -> Result<LineString<f64>, FetchError> {
    points
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(FetchError::Malformed(format!(
                "position with {} ordinates",
                p.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}
