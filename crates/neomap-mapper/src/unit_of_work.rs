//! Pending roots and the write plan a flush derives from them.
//!
//! Planning walks everything reachable from the roots, serializes it, and
//! only then talks to the store, so an invalid entity anywhere in the graph
//! aborts the flush before a single write.

use std::collections::{HashMap, HashSet};

use neomap_core::{Direction, EdgeId, EdgeRecord, MappingError, NodeId, PropertyMap, PropertyValue};
use neomap_core::config::TimestampConfig;
use neomap_graph::{NodeRef, WriteBatch};

use crate::entity::AnyEntity;
use crate::registry::EntityRegistry;
use crate::serializer::{serialize, SerializedEntity};

/// Roots queued by `persist` since the last successful flush.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    pending: Vec<AnyEntity>,
    queued: HashSet<usize>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a root. Returns `false` if the instance was already queued.
    pub fn register(&mut self, entity: AnyEntity) -> bool {
        if !self.queued.insert(entity.key()) {
            return false;
        }
        self.pending.push(entity);
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }

    /// Serialize every entity reachable from the roots through writable
    /// relations, in depth-first pre-order, each instance once.
    pub fn plan(&self, registry: &EntityRegistry) -> Result<FlushPlan, MappingError> {
        let mut plan = FlushPlan::default();
        let mut stack: Vec<AnyEntity> = self.pending.iter().rev().cloned().collect();

        while let Some(entity) = stack.pop() {
            if plan.position.contains_key(&entity.key()) {
                continue;
            }
            let metadata = registry.metadata(entity.name())?;
            let serialized = serialize(&entity, metadata)?;

            for relation in serialized.relations.iter().rev() {
                stack.extend(relation.targets.iter().rev().cloned());
            }
            plan.position.insert(entity.key(), plan.entries.len());
            plan.entries.push(serialized);
        }

        Ok(plan)
    }
}

// ── Flush Plan ────────────────────────────────────────────────────

/// An edge between two planned entities, by instance key.
type EdgeKey = (usize, usize, String);

#[derive(Debug, Default)]
pub struct FlushPlan {
    entries: Vec<SerializedEntity>,
    position: HashMap<usize, usize>,
}

impl FlushPlan {
    pub fn entries(&self) -> &[SerializedEntity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store reads needed to know which desired edges already exist:
    /// one per stored entity and relation direction it writes.
    pub fn edge_reads(&self) -> Vec<(NodeId, Direction)> {
        let mut reads = Vec::new();
        for entry in &self.entries {
            let Some(id) = entry.id else { continue };
            for relation in entry.relations.iter().filter(|r| !r.targets.is_empty()) {
                if !reads.contains(&(id, relation.direction)) {
                    reads.push((id, relation.direction));
                }
            }
        }
        reads
    }

    /// Desired edges with their multiplicity, in first-occurrence order.
    ///
    /// The multiplicity of an edge is the largest number of times a single
    /// relation field lists it, so two fields naming the same edge do not
    /// add up while one field naming a target twice asks for two edges.
    fn desired_edges(&self) -> Vec<(EdgeKey, usize)> {
        let mut order: Vec<EdgeKey> = Vec::new();
        let mut wanted: HashMap<EdgeKey, usize> = HashMap::new();

        for entry in &self.entries {
            let own = entry.entity.key();
            for relation in &entry.relations {
                let mut local: HashMap<EdgeKey, usize> = HashMap::new();
                for target in &relation.targets {
                    let key = match relation.direction {
                        Direction::Outgoing => (own, target.key(), relation.label.clone()),
                        Direction::Incoming => (target.key(), own, relation.label.clone()),
                    };
                    let count = local.entry(key.clone()).or_default();
                    *count += 1;
                    let best = wanted.entry(key.clone()).or_insert_with(|| {
                        order.push(key.clone());
                        0
                    });
                    *best = (*best).max(*count);
                }
            }
        }

        order
            .into_iter()
            .map(|key| {
                let count = wanted.get(&key).copied().unwrap_or_default();
                (key, count)
            })
            .collect()
    }

    fn stored_id(&self, key: usize) -> Option<NodeId> {
        self.position.get(&key).and_then(|&i| self.entries[i].id)
    }

    /// Build the single batch this flush applies.
    pub fn build_batch(&self, existing: &EdgeCounts, stamps: &Stamps) -> WriteBatch {
        let mut batch = WriteBatch::new();
        let mut refs: HashMap<usize, NodeRef> = HashMap::with_capacity(self.entries.len());

        for entry in &self.entries {
            let mut properties = entry.properties.clone();
            let node = match entry.id {
                None => {
                    stamps.on_create(&mut properties);
                    batch.create_node(&entry.label, properties)
                }
                Some(id) => {
                    stamps.on_update(&mut properties);
                    batch.update_node(id, properties)
                }
            };
            refs.insert(entry.entity.key(), node);
        }

        for ((from, to, label), wanted) in self.desired_edges() {
            let stored = match (self.stored_id(from), self.stored_id(to)) {
                (Some(f), Some(t)) => existing.count(f, t, &label),
                _ => 0,
            };
            let (Some(&from_ref), Some(&to_ref)) = (refs.get(&from), refs.get(&to)) else {
                continue;
            };
            for _ in stored..wanted {
                let mut properties = PropertyMap::new();
                stamps.on_edge(&mut properties);
                batch.create_edge(from_ref, to_ref, &label, properties);
            }
        }

        batch
    }

    /// Created entities, in the order their ids come back from the store.
    pub fn created(&self) -> impl Iterator<Item = &SerializedEntity> {
        self.entries.iter().filter(|e| e.is_new())
    }

    pub fn updated(&self) -> impl Iterator<Item = &SerializedEntity> {
        self.entries.iter().filter(|e| !e.is_new())
    }
}

// ── Stored Edges ──────────────────────────────────────────────────

/// Number of stored edges per `(from, to, label)`.
#[derive(Debug, Default)]
pub struct EdgeCounts {
    counts: HashMap<(NodeId, NodeId, String), usize>,
    seen: HashSet<EdgeId>,
}

impl EdgeCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count edges not seen before; the same edge read from both ends
    /// counts once.
    pub fn add(&mut self, edges: impl IntoIterator<Item = EdgeRecord>) {
        for edge in edges {
            if self.seen.insert(edge.id) {
                *self
                    .counts
                    .entry((edge.from, edge.to, edge.label))
                    .or_default() += 1;
            }
        }
    }

    pub fn count(&self, from: NodeId, to: NodeId, label: &str) -> usize {
        self.counts
            .get(&(from, to, label.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

// ── Timestamps ────────────────────────────────────────────────────

/// The timestamp written by one flush, and where it goes.
#[derive(Debug, Clone)]
pub struct Stamps<'a> {
    config: &'a TimestampConfig,
    now: PropertyValue,
}

impl<'a> Stamps<'a> {
    pub fn new(config: &'a TimestampConfig, now: PropertyValue) -> Self {
        Self { config, now }
    }

    pub fn on_create(&self, properties: &mut PropertyMap) {
        if self.config.enabled {
            properties.insert(self.config.creation_property.clone(), self.now.to_storage());
            properties.insert(self.config.update_property.clone(), self.now.to_storage());
        }
    }

    pub fn on_update(&self, properties: &mut PropertyMap) {
        if self.config.enabled {
            properties.insert(self.config.update_property.clone(), self.now.to_storage());
        }
    }

    pub fn on_edge(&self, properties: &mut PropertyMap) {
        if self.config.enabled {
            properties.insert(self.config.creation_property.clone(), self.now.to_storage());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{many, typed_many, Entity, EntityRef};
    use neomap_core::{EntityMetadata, FieldSpec};
    use neomap_graph::{EdgeWrite, NodeWrite};

    #[derive(Debug, Default)]
    struct Node {
        id: Option<i64>,
        next: Vec<EntityRef<Node>>,
        back: Vec<EntityRef<Node>>,
    }

    impl Entity for Node {
        const NAME: &'static str = "Node";

        fn property(&self, field: &str) -> Option<PropertyValue> {
            (field == "id").then(|| self.id.into())
        }

        fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
            match field {
                "id" => self.id = value.extract(Self::NAME, field)?,
                _ => return Err(MappingError::field_access(Self::NAME, field)),
            }
            Ok(())
        }

        fn relation(&self, field: &str) -> Option<Vec<AnyEntity>> {
            match field {
                "next" => Some(many(&self.next)),
                "back" => Some(many(&self.back)),
                _ => None,
            }
        }

        fn set_relation(&mut self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError> {
            match field {
                "next" => self.next = typed_many(targets)?,
                "back" => self.back = typed_many(targets)?,
                _ => return Err(MappingError::field_access(Self::NAME, field)),
            }
            Ok(())
        }
    }

    fn registry() -> EntityRegistry {
        let metadata = EntityMetadata::builder("Node")
            .identity("id")
            .to_many("next", "Node")
            .field(FieldSpec::to_many("back", "Node").read_only().incoming().relation("next"))
            .build()
            .unwrap();
        EntityRegistry::new().with::<Node>(metadata).unwrap()
    }

    fn node(id: Option<i64>) -> EntityRef<Node> {
        Node {
            id,
            ..Default::default()
        }
        .into_ref()
    }

    fn stamps(config: &TimestampConfig) -> Stamps<'_> {
        Stamps::new(config, "foobar".into())
    }

    #[test]
    fn test_register_is_idempotent() {
        let a = node(None);
        let mut uow = UnitOfWork::new();
        assert!(uow.register(AnyEntity::new(&a)));
        assert!(!uow.register(AnyEntity::new(&a)));
        assert_eq!(uow.len(), 1);
        uow.clear();
        assert!(!uow.has_pending());
    }

    #[test]
    fn test_plan_visits_cycle_once_in_pre_order() {
        let a = node(None);
        let b = node(None);
        let c = node(None);
        a.borrow_mut().next = vec![b.clone(), c.clone()];
        b.borrow_mut().next = vec![a.clone()];

        let mut uow = UnitOfWork::new();
        uow.register(AnyEntity::new(&a));
        let plan = uow.plan(&registry()).unwrap();

        let order: Vec<usize> = plan.entries().iter().map(|e| e.entity.key()).collect();
        assert_eq!(
            order,
            vec![
                AnyEntity::new(&a).key(),
                AnyEntity::new(&b).key(),
                AnyEntity::new(&c).key()
            ]
        );
    }

    #[test]
    fn test_read_only_relations_are_not_traversed() {
        let a = node(None);
        let hidden = node(None);
        a.borrow_mut().back = vec![hidden];

        let mut uow = UnitOfWork::new();
        uow.register(AnyEntity::new(&a));
        assert_eq!(uow.plan(&registry()).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_for_new_graph() {
        let a = node(None);
        let b = node(None);
        a.borrow_mut().next = vec![b.clone(), b.clone()];

        let mut uow = UnitOfWork::new();
        uow.register(AnyEntity::new(&a));
        let plan = uow.plan(&registry()).unwrap();
        let config = TimestampConfig::default();
        let batch = plan.build_batch(&EdgeCounts::new(), &stamps(&config));

        assert_eq!(batch.created_count(), 2);
        assert_eq!(batch.edges.len(), 2);
        assert_eq!(
            batch.edges[0],
            EdgeWrite {
                from: NodeRef::Created(0),
                to: NodeRef::Created(1),
                label: "next".to_string(),
                properties: [("creationDate".to_string(), PropertyValue::from("foobar"))]
                    .into_iter()
                    .collect(),
            }
        );
        match &batch.nodes[0] {
            NodeWrite::Create { properties, .. } => {
                assert_eq!(properties.get("creationDate"), Some(&"foobar".into()));
                assert_eq!(properties.get("updateDate"), Some(&"foobar".into()));
            }
            other => panic!("expected a create, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_edges_are_not_rewritten() {
        let a = node(Some(1));
        let b = node(Some(2));
        let c = node(None);
        a.borrow_mut().next = vec![b.clone(), c.clone()];

        let mut uow = UnitOfWork::new();
        uow.register(AnyEntity::new(&a));
        let plan = uow.plan(&registry()).unwrap();
        assert_eq!(plan.edge_reads(), vec![(NodeId(1), Direction::Outgoing)]);

        let mut existing = EdgeCounts::new();
        let edge = EdgeRecord {
            id: EdgeId(10),
            from: NodeId(1),
            to: NodeId(2),
            label: "next".to_string(),
            properties: PropertyMap::new(),
        };
        existing.add([edge.clone(), edge]);
        assert_eq!(existing.count(NodeId(1), NodeId(2), "next"), 1);

        let config = TimestampConfig::default();
        let batch = plan.build_batch(&existing, &stamps(&config));
        assert_eq!(batch.updated_count(), 2);
        assert_eq!(batch.created_count(), 1);
        assert_eq!(batch.edges.len(), 1);
        assert_eq!(batch.edges[0].to, NodeRef::Created(0));

        match &batch.nodes[0] {
            NodeWrite::Update { properties, .. } => {
                assert!(!properties.contains_key("creationDate"));
                assert_eq!(properties.get("updateDate"), Some(&"foobar".into()));
            }
            other => panic!("expected an update, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_timestamps() {
        let config = TimestampConfig {
            enabled: false,
            ..Default::default()
        };
        let mut properties = PropertyMap::new();
        let stamps = stamps(&config);
        stamps.on_create(&mut properties);
        stamps.on_edge(&mut properties);
        assert!(properties.is_empty());
    }

    #[test]
    fn test_unregistered_root_aborts_plan() {
        #[derive(Debug, Default)]
        struct Stray;

        impl Entity for Stray {
            const NAME: &'static str = "Stray";

            fn property(&self, _field: &str) -> Option<PropertyValue> {
                None
            }

            fn set_property(&mut self, field: &str, _value: PropertyValue) -> Result<(), MappingError> {
                Err(MappingError::field_access(Self::NAME, field))
            }
        }

        let mut uow = UnitOfWork::new();
        uow.register(AnyEntity::new(&Stray.into_ref()));
        assert!(matches!(
            uow.plan(&registry()),
            Err(MappingError::NotAnEntity { .. })
        ));
    }
}
