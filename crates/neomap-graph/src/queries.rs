//! Read operations for the object graph.

use neo4rs::{query, Row};

use neomap_core::{Direction, EdgeId, EdgeRecord, NodeId, NodeRecord, PropertyMap, PropertyValue};

use crate::client::{GraphClient, GraphError};
use crate::mutations::{bind_all, checked_name, to_bolt};

const NODE_COLUMNS: &str = "id(n) AS id, labels(n) AS labels, properties(n) AS props";
const EDGE_COLUMNS: &str =
    "id(r) AS id, id(startNode(r)) AS source, id(endNode(r)) AS target, type(r) AS label, properties(r) AS props";

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a node by database id.
    pub async fn fetch_node(&self, id: NodeId) -> Result<Option<NodeRecord>, GraphError> {
        let cypher = format!("MATCH (n) WHERE id(n) = $id RETURN {NODE_COLUMNS}");
        let q = query(&cypher).param("id", id.0);

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Get nodes of a label by exact property match, ordered by id.
    pub async fn find_nodes_by_property(
        &self,
        label: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let label = checked_name(label)?;
        let property = checked_name(property)?;
        let cypher = format!(
            "MATCH (n:`{label}`) WHERE n.`{property}` = $value
             RETURN {NODE_COLUMNS}
             ORDER BY id(n)"
        );

        let q = query(&cypher).param("value", to_bolt(value));
        tracing::debug!(label, property, "Index lookup");
        self.collect_nodes(q).await
    }

    // ── List Queries ─────────────────────────────────────────────

    /// List all nodes of a label, ordered by id.
    pub async fn list_nodes(&self, label: &str) -> Result<Vec<NodeRecord>, GraphError> {
        let label = checked_name(label)?;
        let cypher = format!("MATCH (n:`{label}`) RETURN {NODE_COLUMNS} ORDER BY id(n)");
        self.collect_nodes(query(&cypher)).await
    }

    // ── Edge Queries ─────────────────────────────────────────────

    /// Edges on one side of a node, in creation order.
    pub async fn fetch_edges(
        &self,
        id: NodeId,
        direction: Direction,
    ) -> Result<Vec<EdgeRecord>, GraphError> {
        let pattern = match direction {
            Direction::Outgoing => "(n)-[r]->()",
            Direction::Incoming => "(n)<-[r]-()",
        };
        let cypher = format!(
            "MATCH {pattern} WHERE id(n) = $id
             RETURN {EDGE_COLUMNS}
             ORDER BY id(r)"
        );

        let rows = self.query_rows(query(&cypher).param("id", id.0)).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(row_to_edge(&row)?);
        }
        Ok(results)
    }

    // ── Ad-hoc Queries ───────────────────────────────────────────

    /// Run a caller-supplied Cypher template with bound parameters.
    pub async fn run_template(
        &self,
        template: &str,
        bindings: &PropertyMap,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        let params = bindings
            .iter()
            .map(|(k, v)| (k.clone(), to_bolt(v)))
            .collect();
        let rows = self.query_rows(bind_all(query(template), params)).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let value: serde_json::Value = row.to().map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize query row: {e}"))
            })?;
            results.push(value);
        }
        Ok(results)
    }

    async fn collect_nodes(&self, q: neo4rs::Query) -> Result<Vec<NodeRecord>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(row_to_node(&row)?);
        }
        Ok(results)
    }
}

/// Convert a node row (`NODE_COLUMNS`) to a NodeRecord.
fn row_to_node(row: &Row) -> Result<NodeRecord, GraphError> {
    let id: i64 = row
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Failed to read node id: {e}")))?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();
    let properties: PropertyMap = row.get("props").map_err(|e| {
        GraphError::Serialization(format!("Failed to read properties of node {id}: {e}"))
    })?;

    Ok(NodeRecord {
        id: NodeId(id),
        label: labels.into_iter().next().unwrap_or_default(),
        properties,
    })
}

/// Convert an edge row (`EDGE_COLUMNS`) to an EdgeRecord.
fn row_to_edge(row: &Row) -> Result<EdgeRecord, GraphError> {
    let read_id = |key: &str| -> Result<i64, GraphError> {
        row.get(key)
            .map_err(|e| GraphError::Serialization(format!("Failed to read edge {key}: {e}")))
    };

    let properties: PropertyMap = row.get("props").map_err(|e| {
        GraphError::Serialization(format!("Failed to read edge properties: {e}"))
    })?;

    Ok(EdgeRecord {
        id: EdgeId(read_id("id")?),
        from: NodeId(read_id("source")?),
        to: NodeId(read_id("target")?),
        label: row.get("label").unwrap_or_default(),
        properties,
    })
}
