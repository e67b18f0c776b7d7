//! Coordinate reference systems and reprojection into WGS84 lon/lat.

use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::NormalizationError;

/// WGS84 / Web Mercator sphere radius in metres
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Source CRS of a raw layer. Every spatial layer is stored in [`Crs::Wgs84`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG:4326 / OGC CRS84
    #[default]
    Wgs84,
    /// EPSG:4269, coincident with WGS84 at boundary precision
    Nad83,
    /// EPSG:3857 (also published as 900913 and ESRI 102100)
    WebMercator,
    Other(String),
}

impl Crs {
    /// Parse a CRS name such as `EPSG:4326` or `urn:ogc:def:crs:EPSG::3857`
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.to_ascii_uppercase().ends_with("CRS84") {
            return Crs::Wgs84;
        }
        let code = trimmed
            .rsplit(|c: char| c == ':' || c == '/')
            .next()
            .and_then(|s| s.parse::<u32>().ok());
        match code {
            Some(4326) => Crs::Wgs84,
            Some(4269) => Crs::Nad83,
            Some(3857) | Some(900913) | Some(102100) | Some(102113) => Crs::WebMercator,
            _ => Crs::Other(trimmed.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Crs::Other(_))
    }
}

/// Reproject a geometry into WGS84 lon/lat.
pub fn to_wgs84(
    geometry: MultiPolygon<f64>,
    crs: &Crs,
) -> Result<MultiPolygon<f64>, NormalizationError> {
    match crs {
        Crs::Wgs84 | Crs::Nad83 => Ok(geometry),
        Crs::WebMercator => Ok(geometry.map_coords(web_mercator_to_lon_lat)),
        Crs::Other(name) => Err(NormalizationError::UnsupportedCrs(name.clone())),
    }
}

fn web_mercator_to_lon_lat(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    Coord { x: lon, y: lat }
}
