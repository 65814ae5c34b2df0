//! The storage seam between the mapper and a graph database.

use neomap_core::{Direction, EdgeRecord, NodeId, NodeRecord, PropertyMap, PropertyValue};

use crate::client::{GraphClient, GraphError};

/// A node referenced by a batch: either already stored, or created earlier
/// in the same batch (by creation ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Existing(NodeId),
    Created(usize),
}

impl NodeRef {
    /// Resolve against the ids assigned to the batch's created nodes.
    pub fn resolve(&self, created: &[NodeId]) -> Result<NodeId, GraphError> {
        match self {
            Self::Existing(id) => Ok(*id),
            Self::Created(idx) => created.get(*idx).copied().ok_or_else(|| {
                GraphError::InvalidBatch(format!("edge refers to uncreated node #{idx}"))
            }),
        }
    }
}

/// One node write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeWrite {
    Create {
        label: String,
        properties: PropertyMap,
    },
    /// Sets the given properties; properties not listed are left alone.
    Update {
        id: NodeId,
        properties: PropertyMap,
    },
}

/// One edge creation in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWrite {
    pub from: NodeRef,
    pub to: NodeRef,
    pub label: String,
    pub properties: PropertyMap,
}

/// Everything one flush writes. Applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub nodes: Vec<NodeWrite>,
    pub edges: Vec<EdgeWrite>,
    created: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node creation and return a reference usable by later edges.
    pub fn create_node(&mut self, label: &str, properties: PropertyMap) -> NodeRef {
        self.nodes.push(NodeWrite::Create {
            label: label.to_string(),
            properties,
        });
        self.created += 1;
        NodeRef::Created(self.created - 1)
    }

    pub fn update_node(&mut self, id: NodeId, properties: PropertyMap) -> NodeRef {
        self.nodes.push(NodeWrite::Update { id, properties });
        NodeRef::Existing(id)
    }

    pub fn create_edge(&mut self, from: NodeRef, to: NodeRef, label: &str, properties: PropertyMap) {
        self.edges.push(EdgeWrite {
            from,
            to,
            label: label.to_string(),
            properties,
        });
    }

    /// Number of node creations queued.
    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn updated_count(&self) -> usize {
        self.nodes.len() - self.created
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Storage operations the mapper relies on.
///
/// Implementations must apply a [`WriteBatch`] atomically and return the ids
/// of created nodes in creation order. Reads return edges ordered by edge id
/// (creation order) and nodes ordered by node id.
#[allow(async_fn_in_trait)]
pub trait GraphStore {
    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError>;

    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, GraphError>;

    /// Edges touching `id` on the given side, ordered by edge id.
    ///
    /// Edge ids only track creation order while no edges are deleted. Neo4j
    /// reuses the ids of deleted relationships, so after another writer
    /// deletes edges a newer edge may sort before an older one. The mapper
    /// never deletes edges itself.
    async fn get_edges(&self, id: NodeId, direction: Direction) -> Result<Vec<EdgeRecord>, GraphError>;

    /// Exact-match lookup of `label` nodes by one property.
    async fn lookup_by_index(
        &self,
        label: &str,
        field: &str,
        value: &PropertyValue,
    ) -> Result<Vec<NodeRecord>, GraphError>;

    async fn nodes_by_label(&self, label: &str) -> Result<Vec<NodeRecord>, GraphError>;

    /// Run an ad-hoc query; rows come back as JSON objects keyed by column.
    async fn run_query(
        &self,
        template: &str,
        bindings: &PropertyMap,
    ) -> Result<Vec<serde_json::Value>, GraphError>;
}

impl GraphStore for GraphClient {
    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError> {
        self.apply_batch(batch).await
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, GraphError> {
        self.fetch_node(id).await
    }

    async fn get_edges(&self, id: NodeId, direction: Direction) -> Result<Vec<EdgeRecord>, GraphError> {
        self.fetch_edges(id, direction).await
    }

    async fn lookup_by_index(
        &self,
        label: &str,
        field: &str,
        value: &PropertyValue,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.find_nodes_by_property(label, field, value).await
    }

    async fn nodes_by_label(&self, label: &str) -> Result<Vec<NodeRecord>, GraphError> {
        self.list_nodes(label).await
    }

    async fn run_query(
        &self,
        template: &str,
        bindings: &PropertyMap,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        self.run_template(template, bindings).await
    }
}
