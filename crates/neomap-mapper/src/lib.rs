//! neomap-mapper: maps typed Rust entities onto a Neo4j graph.
//!
//! - [`Entity`]: how an application type exposes its persistent fields
//! - [`EntityRegistry`]: which types are entities and what their metadata is
//! - [`EntityManager`]: persist/flush, find, repositories and ad-hoc queries
//!
//! Writes are collected by a unit of work and applied as a single batch;
//! reads are eager and go through a per-manager identity map.

pub mod entity;
pub mod error;
pub mod hydrator;
pub mod identity;
pub mod manager;
pub mod query;
pub mod registry;
pub mod repository;
pub mod serializer;
pub mod unit_of_work;

pub use entity::{many, one, typed_many, typed_one, AnyEntity, Entity, EntityRef};
pub use error::{MapperError, Result};
pub use identity::IdentityMap;
pub use manager::{EntityManager, FlushSummary};
pub use query::GraphQuery;
pub use registry::EntityRegistry;
pub use repository::{Matches, Repository};

pub use neomap_core::{
    EntityMetadata, FieldSpec, MappingError, NodeId, PropertyMap, PropertyValue, Schema,
};
