//! Source registry: the declarative catalog of boundary feeds.
//!
//! A catalog is a TOML document with a `[[source]]` entry per
//! (jurisdiction, boundary type). Entries are typed on parse; field-mapping
//! rules are checked by [`validate`] before any network call is made.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::SchemaError;
use crate::models::{JurisdictionScope, SourceDescriptor, SourceFormat, ID_FIELD, NAME_FIELD};

const WASHINGTON_CATALOG: &str = include_str!("../../catalogs/washington.toml");

/// Check a descriptor's field mapping and format requirements.
pub fn validate(descriptor: &SourceDescriptor) -> Result<(), SchemaError> {
    if descriptor.fields.is_empty() {
        return Err(SchemaError::EmptyMapping);
    }

    let mut seen = HashSet::new();
    for mapping in descriptor.fields.iter() {
        if mapping.target.trim().is_empty() {
            return Err(SchemaError::EmptyTarget(mapping.source.clone()));
        }
        if !seen.insert(mapping.target.as_str()) {
            return Err(SchemaError::DuplicateTarget(mapping.target.clone()));
        }
    }

    for required in [ID_FIELD, NAME_FIELD] {
        if !seen.contains(required) {
            return Err(SchemaError::MissingTarget(required));
        }
    }

    if descriptor.format == SourceFormat::FileGeodatabase
        && descriptor.location.layer_name.is_none()
    {
        return Err(SchemaError::MissingLocationField {
            format: SourceFormat::FileGeodatabase.as_str(),
            field: "layer_name",
        });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    state: String,
    #[serde(default, rename = "source")]
    sources: Vec<SourceDescriptor>,
}

/// Immutable set of source descriptors for one state.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    state: String,
    descriptors: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(state: impl Into<String>, descriptors: Vec<SourceDescriptor>) -> Self {
        Self {
            state: state.into(),
            descriptors,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        let doc: CatalogDocument = toml::from_str(content)?;
        debug!("Parsed catalog for {} with {} sources", doc.state, doc.sources.len());
        Ok(Self::new(doc.state.to_uppercase(), doc.sources))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = fs::read_to_string(path).context("Failed to read source catalog")?;
        Ok(Self::from_toml(&content)?)
    }

    /// The built-in Washington State catalog
    pub fn washington() -> Result<Self, SchemaError> {
        Self::from_toml(WASHINGTON_CATALOG)
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn descriptors(&self) -> &[SourceDescriptor] {
        &self.descriptors
    }

    /// Every descriptor whose scope is exactly `scope`, in catalog order
    pub fn all_descriptors(&self, scope: &JurisdictionScope) -> Vec<&SourceDescriptor> {
        self.descriptors.iter().filter(|d| &d.scope == scope).collect()
    }

    /// Distinct scopes present in the catalog, in catalog order
    pub fn scopes(&self) -> Vec<&JurisdictionScope> {
        let mut out: Vec<&JurisdictionScope> = Vec::new();
        for d in &self.descriptors {
            if !out.contains(&&d.scope) {
                out.push(&d.scope);
            }
        }
        out
    }
}
