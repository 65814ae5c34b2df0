//! neomap-core: Shared types, entity metadata, and error handling for neomap.
//!
//! This crate provides the foundational pieces used by every neomap crate:
//! - Graph primitives (node/edge ids, records, property values)
//! - Entity metadata (fields, relations, visibility, indexes) and schema validation
//! - Configuration management
//! - The mapping error taxonomy

pub mod config;
pub mod error;
pub mod metadata;
pub mod types;

pub use error::MappingError;
pub use metadata::{EntityMetadata, FieldKind, FieldSpec, MetadataBuilder, Schema, Visibility};
pub use types::{
    Direction, EdgeId, EdgeRecord, FromProperty, NodeId, NodeRecord, PropertyMap, PropertyValue,
};
