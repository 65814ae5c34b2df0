//! Rebuilds typed entities from stored nodes and edges.
//!
//! Hydration is eager: every entity reachable through readable relations is
//! loaded before the call returns. Instances enter the identity map before
//! their relations are resolved, which is what makes cyclic graphs finish.
//! A call that fails takes back every instance it put in the identity map.

use std::collections::{HashMap, VecDeque};

use neomap_core::{Direction, EdgeRecord, FieldKind, FieldSpec, MappingError, NodeId, NodeRecord, PropertyValue};
use neomap_graph::GraphStore;

use crate::entity::AnyEntity;
use crate::error::Result;
use crate::identity::IdentityMap;
use crate::registry::EntityRegistry;

pub struct Hydrator<'a, S: GraphStore> {
    store: &'a S,
    registry: &'a EntityRegistry,
    identity: &'a mut IdentityMap,
    work: VecDeque<(AnyEntity, NodeRecord)>,
    attached: Vec<NodeId>,
}

impl<'a, S: GraphStore> Hydrator<'a, S> {
    pub fn new(store: &'a S, registry: &'a EntityRegistry, identity: &'a mut IdentityMap) -> Self {
        Self {
            store,
            registry,
            identity,
            work: VecDeque::new(),
            attached: Vec::new(),
        }
    }

    /// The entity for node `id`, from the identity map or the store.
    pub async fn load(&mut self, id: NodeId) -> Result<Option<AnyEntity>> {
        if let Some(entity) = self.identity.get(id) {
            return Ok(Some(entity.clone()));
        }
        match self.store.get_node(id).await? {
            Some(record) => self.hydrate(record).await.map(Some),
            None => Ok(None),
        }
    }

    /// The entity for an already fetched node.
    pub async fn hydrate(&mut self, record: NodeRecord) -> Result<AnyEntity> {
        if let Some(entity) = self.identity.get(record.id) {
            return Ok(entity.clone());
        }
        let result = match self.instantiate(record) {
            Ok(entity) => self.drain().await.map(|()| entity),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.rollback();
        }
        self.attached.clear();
        result
    }

    /// Forget the half-built instances of a failed call.
    fn rollback(&mut self) {
        self.work.clear();
        for id in self.attached.drain(..) {
            self.identity.detach(id);
        }
        tracing::debug!("Discarded partially hydrated entities");
    }

    /// Create an empty instance for `record`, give it its id, and queue it.
    fn instantiate(&mut self, record: NodeRecord) -> Result<AnyEntity> {
        let entity = self.registry.instantiate(&record.label)?;
        let metadata = self.registry.metadata(&record.label)?;
        entity.set_property(metadata.identity()?, PropertyValue::Int(record.id.0))?;

        if self.identity.attach(record.id, entity.clone()) {
            self.attached.push(record.id);
        }
        self.work.push_back((entity.clone(), record));
        Ok(entity)
    }

    async fn drain(&mut self) -> Result<()> {
        while let Some((entity, record)) = self.work.pop_front() {
            self.populate(&entity, &record).await?;
        }
        Ok(())
    }

    async fn populate(&mut self, entity: &AnyEntity, record: &NodeRecord) -> Result<()> {
        let registry = self.registry;
        let metadata = registry.metadata(entity.name())?;

        for field in metadata.property_fields().filter(|f| f.is_readable()) {
            let Some(value) = record.properties.get(&field.name) else {
                continue;
            };
            let value = match field.kind {
                FieldKind::Date => typed_date(&metadata.name, &field.name, value)?,
                _ => value.clone(),
            };
            entity.set_property(&field.name, value)?;
        }

        let mut edges: HashMap<Direction, Vec<EdgeRecord>> = HashMap::new();
        for field in metadata.relation_fields().filter(|f| f.is_readable()) {
            if !edges.contains_key(&field.direction) {
                let mut fetched = self.store.get_edges(record.id, field.direction).await?;
                fetched.sort_by_key(|e| e.id);
                edges.insert(field.direction, fetched);
            }
            let ends: Vec<NodeId> = edges
                .get(&field.direction)
                .map(|all| {
                    all.iter()
                        .filter(|e| e.label == field.label())
                        .map(|e| e.other_end(field.direction))
                        .collect()
                })
                .unwrap_or_default();

            let mut targets = self.resolve(record.id, field, ends).await?;
            // Highest edge id; see `GraphStore::get_edges` for when that is not the newest.
            if field.kind == FieldKind::ToOne && targets.len() > 1 {
                targets = targets.split_off(targets.len() - 1);
            }
            entity.set_relation(&field.name, targets)?;
        }

        tracing::debug!(entity = %metadata.name, id = %record.id, "Hydrated entity");
        Ok(())
    }

    /// Entities at the far end of a relation's edges, in edge order.
    async fn resolve(&mut self, from: NodeId, field: &FieldSpec, ends: Vec<NodeId>) -> Result<Vec<AnyEntity>> {
        let expected = field.target.as_deref().unwrap_or_default();
        let mut targets = Vec::with_capacity(ends.len());

        for id in ends {
            if let Some(entity) = self.identity.get(id) {
                targets.push(entity.clone());
                continue;
            }
            let Some(record) = self.store.get_node(id).await? else {
                tracing::warn!(from = %from, to = %id, relation = field.label(), "Edge points at a missing node");
                continue;
            };
            if record.label != expected {
                tracing::warn!(
                    from = %from,
                    to = %id,
                    expected,
                    found = %record.label,
                    "Edge points at a node of another entity type"
                );
                continue;
            }
            targets.push(self.instantiate(record)?);
        }
        Ok(targets)
    }
}

fn typed_date(entity: &str, field: &str, value: &PropertyValue) -> std::result::Result<PropertyValue, MappingError> {
    if value.is_null() {
        return Ok(PropertyValue::Null);
    }
    value
        .as_date()
        .map(PropertyValue::Date)
        .ok_or_else(|| MappingError::invalid_value(entity, field, "date", value.type_name()))
}
