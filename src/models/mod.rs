pub mod boundary;
pub mod source;

pub use boundary::Boundary;
pub use source::{
    FieldMap, FieldMapping, JurisdictionScope, LayerKey, Location, Resource, SourceDescriptor,
    SourceFormat, ID_FIELD, NAME_FIELD,
};
