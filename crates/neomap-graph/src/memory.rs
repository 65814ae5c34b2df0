//! In-process graph store.
//!
//! Mirrors the Neo4j backend's observable behavior (id assignment order,
//! null properties removed, edges returned in creation order) without a
//! server. Every call is counted, writes can be made to fail, and ad-hoc
//! queries are answered from registered stubs, which makes it the backend
//! of choice for exercising the mapper.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use neomap_core::{Direction, EdgeId, EdgeRecord, NodeId, NodeRecord, PropertyMap, PropertyValue};

use crate::client::GraphError;
use crate::store::{GraphStore, NodeWrite, WriteBatch};

/// Number of store calls made, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub batches: usize,
    pub node_reads: usize,
    pub edge_reads: usize,
    pub lookups: usize,
    pub queries: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.batches + self.node_reads + self.edge_reads + self.lookups + self.queries
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, NodeRecord>,
    edges: Vec<EdgeRecord>,
    next_node: i64,
    next_edge: i64,
}

impl GraphState {
    fn set_properties(properties: &mut PropertyMap, updates: &PropertyMap) {
        for (key, value) in updates {
            let value = value.to_storage();
            if value.is_null() {
                properties.remove(key);
            } else {
                properties.insert(key.clone(), value);
            }
        }
    }

    fn apply(&mut self, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError> {
        let mut created = Vec::with_capacity(batch.created_count());

        for op in &batch.nodes {
            match op {
                NodeWrite::Create { label, properties } => {
                    let id = NodeId(self.next_node);
                    self.next_node += 1;
                    let mut record = NodeRecord {
                        id,
                        label: label.clone(),
                        properties: PropertyMap::new(),
                    };
                    Self::set_properties(&mut record.properties, properties);
                    self.nodes.insert(id, record);
                    created.push(id);
                }
                NodeWrite::Update { id, properties } => {
                    let record = self.nodes.get_mut(id).ok_or(GraphError::NotFound {
                        kind: "Node",
                        id: id.0,
                    })?;
                    Self::set_properties(&mut record.properties, properties);
                }
            }
        }

        for edge in &batch.edges {
            let from = edge.from.resolve(&created)?;
            let to = edge.to.resolve(&created)?;
            for end in [from, to] {
                if !self.nodes.contains_key(&end) {
                    return Err(GraphError::NotFound {
                        kind: "Node",
                        id: end.0,
                    });
                }
            }

            let mut properties = PropertyMap::new();
            Self::set_properties(&mut properties, &edge.properties);
            self.edges.push(EdgeRecord {
                id: EdgeId(self.next_edge),
                from,
                to,
                label: edge.label.clone(),
                properties,
            });
            self.next_edge += 1;
        }

        Ok(created)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: RefCell<GraphState>,
    counts: Cell<CallCounts>,
    fail_writes: Cell<bool>,
    stubs: RefCell<BTreeMap<String, Vec<serde_json::Value>>>,
    executed: RefCell<Vec<(String, PropertyMap)>>,
}

/// Shared in-process graph. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    inner: Rc<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        let mut counts = self.inner.counts.get();
        bump(&mut counts);
        self.inner.counts.set(counts);
    }

    /// Calls made so far.
    pub fn counts(&self) -> CallCounts {
        self.inner.counts.get()
    }

    /// Make every subsequent batch fail as if the server were unreachable.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }

    /// Register the rows returned for an ad-hoc query template.
    pub fn stub_query(&self, template: &str, rows: Vec<serde_json::Value>) {
        self.inner
            .stubs
            .borrow_mut()
            .insert(template.to_string(), rows);
    }

    /// Ad-hoc queries run so far, with their resolved bindings.
    pub fn executed_queries(&self) -> Vec<(String, PropertyMap)> {
        self.inner.executed.borrow().clone()
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRecord> {
        self.inner.state.borrow().nodes.get(&id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.inner.state.borrow().nodes.len()
    }

    /// All edges in creation order.
    pub fn edges(&self) -> Vec<EdgeRecord> {
        self.inner.state.borrow().edges.clone()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.state.borrow().edges.len()
    }
}

impl GraphStore for MemoryGraph {
    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError> {
        self.count(|c| c.batches += 1);
        if self.inner.fail_writes.get() {
            return Err(GraphError::Connection(
                "memory graph is refusing writes".to_string(),
            ));
        }

        // Apply to a copy so a failing op leaves the graph untouched.
        let mut next = self.inner.state.borrow().clone();
        let created = next.apply(batch)?;
        *self.inner.state.borrow_mut() = next;
        Ok(created)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, GraphError> {
        self.count(|c| c.node_reads += 1);
        Ok(self.node(id))
    }

    async fn get_edges(&self, id: NodeId, direction: Direction) -> Result<Vec<EdgeRecord>, GraphError> {
        self.count(|c| c.edge_reads += 1);
        let state = self.inner.state.borrow();
        Ok(state
            .edges
            .iter()
            .filter(|e| match direction {
                Direction::Outgoing => e.from == id,
                Direction::Incoming => e.to == id,
            })
            .cloned()
            .collect())
    }

    async fn lookup_by_index(
        &self,
        label: &str,
        field: &str,
        value: &PropertyValue,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.count(|c| c.lookups += 1);
        let wanted = value.to_storage();
        let state = self.inner.state.borrow();
        Ok(state
            .nodes
            .values()
            .filter(|n| n.label == label && n.properties.get(field) == Some(&wanted))
            .cloned()
            .collect())
    }

    async fn nodes_by_label(&self, label: &str) -> Result<Vec<NodeRecord>, GraphError> {
        self.count(|c| c.lookups += 1);
        let state = self.inner.state.borrow();
        Ok(state
            .nodes
            .values()
            .filter(|n| n.label == label)
            .cloned()
            .collect())
    }

    async fn run_query(
        &self,
        template: &str,
        bindings: &PropertyMap,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        self.count(|c| c.queries += 1);
        let resolved = bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.to_storage()))
            .collect();
        self.inner
            .executed
            .borrow_mut()
            .push((template.to_string(), resolved));
        Ok(self
            .inner
            .stubs
            .borrow()
            .get(template)
            .cloned()
            .unwrap_or_default())
    }
}
