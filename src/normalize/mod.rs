//! Layer normalizer: raw source attributes onto canonical boundary fields.
//!
//! A layer is all-or-nothing. One feature lacking `id`, `name` or a
//! geometry rejects the whole layer, as does a repeated id.

pub mod crs;

pub use crs::{to_wgs84, Crs};

use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::NormalizeConfig;
use crate::error::NormalizationError;
use crate::fetch::{RawFeature, RawFeatureCollection};
use crate::models::{Boundary, SourceDescriptor, ID_FIELD, NAME_FIELD};
use crate::pip::SpatialLayer;

/// Build the spatial layer for `descriptor` out of its raw features.
pub fn normalize(
    raw: RawFeatureCollection,
    descriptor: &SourceDescriptor,
    config: &NormalizeConfig,
) -> Result<SpatialLayer, NormalizationError> {
    let key = descriptor.key();
    if let Crs::Other(name) = &raw.crs {
        return Err(NormalizationError::UnsupportedCrs(name.clone()));
    }

    let crs = &raw.crs;
    let boundaries: Vec<Boundary> = raw
        .features
        .into_par_iter()
        .enumerate()
        .map(|(index, feature)| to_boundary(index, feature, descriptor, crs, config))
        .collect::<Result<_, _>>()?;

    let mut seen = HashSet::with_capacity(boundaries.len());
    for boundary in &boundaries {
        if !seen.insert(boundary.id.as_str()) {
            return Err(NormalizationError::DuplicateId(boundary.id.clone()));
        }
    }

    if boundaries.is_empty() {
        debug!("Layer {} normalized to zero boundaries", key);
    }
    info!("Normalized {} boundaries for {}", boundaries.len(), key);

    Ok(SpatialLayer::new(key, boundaries))
}

fn to_boundary(
    index: usize,
    feature: RawFeature,
    descriptor: &SourceDescriptor,
    crs: &Crs,
    config: &NormalizeConfig,
) -> Result<Boundary, NormalizationError> {
    let mut id = None;
    let mut name = None;
    let mut attributes = Vec::new();

    for field in descriptor.fields.iter() {
        let value = feature
            .attributes
            .get(&field.source)
            .and_then(attribute_text)
            .map(|v| if config.casefold { v.to_lowercase() } else { v });

        match field.target.as_str() {
            ID_FIELD => id = value,
            NAME_FIELD => name = value,
            other => {
                if let Some(v) = value {
                    attributes.push((other.to_string(), v));
                }
            }
        }
    }

    let id = id.ok_or_else(|| missing(index, ID_FIELD, descriptor))?;
    let name = name.ok_or_else(|| missing(index, NAME_FIELD, descriptor))?;
    let geometry = feature
        .geometry
        .ok_or(NormalizationError::MissingGeometry { index })?;

    let mut boundary = Boundary::new(id, name, to_wgs84(geometry, crs)?);
    boundary.attributes.extend(attributes);
    Ok(boundary)
}

fn missing(index: usize, canonical: &str, descriptor: &SourceDescriptor) -> NormalizationError {
    NormalizationError::MissingField {
        index,
        canonical: canonical.to_string(),
        source_field: descriptor
            .fields
            .source_for(canonical)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Attribute value as text; null and blank strings count as absent
fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => match n.as_f64() {
            // Services often publish integer codes as doubles
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
