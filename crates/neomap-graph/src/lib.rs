//! neomap-graph: storage backends for the object-graph mapper.
//!
//! The mapper talks to the database only through the [`GraphStore`] trait.
//! Two backends are provided: [`GraphClient`] runs Cypher against Neo4j over
//! Bolt, and [`MemoryGraph`] keeps the graph in process for tests and tools.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::{CallCounts, MemoryGraph};
pub use store::{EdgeWrite, GraphStore, NodeRef, NodeWrite, WriteBatch};
