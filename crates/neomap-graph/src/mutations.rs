//! Write operations for the object graph.
//!
//! A flush arrives as one [`WriteBatch`] and is applied inside a single
//! transaction: node creations first (collecting their ids), then updates,
//! then edges resolved against the freshly created ids.

use neo4rs::{query, BoltNull, BoltType, Query, Txn};

use neomap_core::metadata::is_identifier;
use neomap_core::{NodeId, PropertyMap, PropertyValue};

use crate::client::{GraphClient, GraphError};
use crate::store::{NodeWrite, WriteBatch};

impl GraphClient {
    // ── Batch Application ────────────────────────────────────────

    /// Apply a write batch in one transaction, returning created node ids.
    pub async fn apply_batch(&self, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError> {
        let mut txn = self.start_txn().await?;

        match write_batch(&mut txn, batch).await {
            Ok(created) => {
                txn.commit().await?;
                tracing::debug!(
                    created = created.len(),
                    updated = batch.updated_count(),
                    edges = batch.edges.len(),
                    "Committed write batch"
                );
                Ok(created)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback of failed write batch failed");
                }
                Err(e)
            }
        }
    }
}

async fn write_batch(txn: &mut Txn, batch: &WriteBatch) -> Result<Vec<NodeId>, GraphError> {
    let mut created = Vec::with_capacity(batch.created_count());

    for op in &batch.nodes {
        match op {
            NodeWrite::Create { label, properties } => {
                let q = create_node_query(label, properties)?;
                let mut stream = txn.execute(q).await?;
                let row = stream.next(txn.handle()).await?.ok_or_else(|| {
                    GraphError::Serialization(format!("CREATE of {label} returned no id"))
                })?;
                let id: i64 = row.get("id").map_err(|e| {
                    GraphError::Serialization(format!("Failed to read created node id: {e}"))
                })?;
                created.push(NodeId(id));
            }
            NodeWrite::Update { id, properties } => {
                if !properties.is_empty() {
                    txn.run(update_node_query(*id, properties)?).await?;
                }
            }
        }
    }

    for edge in &batch.edges {
        let from = edge.from.resolve(&created)?;
        let to = edge.to.resolve(&created)?;
        txn.run(create_edge_query(from, to, &edge.label, &edge.properties)?)
            .await?;
    }

    Ok(created)
}

// ── Query Builders ───────────────────────────────────────────────

fn create_node_query(label: &str, properties: &PropertyMap) -> Result<Query, GraphError> {
    let label = checked_name(label)?;
    let (set, params) = set_clause("n", properties)?;
    let cypher = format!("CREATE (n:`{label}`) {set} RETURN id(n) AS id");
    Ok(bind_all(query(&cypher), params))
}

fn update_node_query(id: NodeId, properties: &PropertyMap) -> Result<Query, GraphError> {
    let (set, params) = set_clause("n", properties)?;
    let cypher = format!("MATCH (n) WHERE id(n) = $node_id {set}");
    Ok(bind_all(query(&cypher), params).param("node_id", id.0))
}

fn create_edge_query(
    from: NodeId,
    to: NodeId,
    label: &str,
    properties: &PropertyMap,
) -> Result<Query, GraphError> {
    let label = checked_name(label)?;
    let (set, params) = set_clause("r", properties)?;
    let cypher = format!(
        "MATCH (a), (b) WHERE id(a) = $from_id AND id(b) = $to_id
         CREATE (a)-[r:`{label}`]->(b) {set}"
    );
    Ok(bind_all(query(&cypher), params)
        .param("from_id", from.0)
        .param("to_id", to.0))
}

/// `SET v.`k0` = $p0, ...` plus its parameters; empty when there is nothing to set.
fn set_clause(var: &str, properties: &PropertyMap) -> Result<(String, Vec<(String, BoltType)>), GraphError> {
    if properties.is_empty() {
        return Ok((String::new(), Vec::new()));
    }

    let mut assignments = Vec::with_capacity(properties.len());
    let mut params = Vec::with_capacity(properties.len());
    for (i, (key, value)) in properties.iter().enumerate() {
        let key = checked_name(key)?;
        let param = format!("p{i}");
        assignments.push(format!("{var}.`{key}` = ${param}"));
        params.push((param, to_bolt(value)));
    }
    Ok((format!("SET {}", assignments.join(", ")), params))
}

// ── Helpers ──────────────────────────────────────────────────────

pub(crate) fn bind_all(mut q: Query, params: Vec<(String, BoltType)>) -> Query {
    for (key, value) in params {
        q = q.param(&key, value);
    }
    q
}

/// Labels and property keys are spliced into Cypher, so they must be plain identifiers.
pub(crate) fn checked_name(name: &str) -> Result<&str, GraphError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(GraphError::InvalidName(name.to_string()))
    }
}

/// Convert a property value into its Bolt form. Dates are stored as RFC 3339.
pub(crate) fn to_bolt(value: &PropertyValue) -> BoltType {
    match value.to_storage() {
        PropertyValue::Null => BoltType::Null(BoltNull),
        PropertyValue::Bool(b) => b.into(),
        PropertyValue::Int(i) => i.into(),
        PropertyValue::Float(f) => f.into(),
        PropertyValue::String(s) => s.into(),
        PropertyValue::Date(d) => d.to_rfc3339().into(),
    }
}
