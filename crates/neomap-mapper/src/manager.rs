//! The entity manager: one mapping session over a graph store.

use chrono::Utc;
use neomap_core::config::{MapperConfig, TimestampConfig};
use neomap_core::{MappingError, NodeId, PropertyValue};
use neomap_graph::{GraphError, GraphStore};
use tracing::Instrument;
use uuid::Uuid;

use crate::entity::{AnyEntity, Entity, EntityRef};
use crate::error::Result;
use crate::hydrator::Hydrator;
use crate::identity::IdentityMap;
use crate::query::GraphQuery;
use crate::registry::EntityRegistry;
use crate::repository::Repository;
use crate::unit_of_work::{EdgeCounts, FlushPlan, Stamps, UnitOfWork};

type DateGenerator = Box<dyn Fn() -> PropertyValue>;

/// What one flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub created: usize,
    pub updated: usize,
    pub edges: usize,
}

/// Persists entities, tracks their identity, and loads them back.
///
/// A manager is one session: entities it loads stay unique per node id until
/// [`clear`](Self::clear), and nothing is shared with other managers even
/// over the same store.
pub struct EntityManager<S: GraphStore> {
    store: S,
    registry: EntityRegistry,
    identity: IdentityMap,
    unit_of_work: UnitOfWork,
    date_generator: DateGenerator,
    timestamps: TimestampConfig,
    session_id: Uuid,
}

impl<S: GraphStore> EntityManager<S> {
    /// Fails if a relation targets an entity the registry does not know.
    pub fn new(store: S, registry: EntityRegistry) -> Result<Self> {
        registry.validate()?;
        let session_id = Uuid::new_v4();
        tracing::debug!(session = %session_id, entities = registry.len(), "Opened entity manager");

        Ok(Self {
            store,
            registry,
            identity: IdentityMap::new(),
            unit_of_work: UnitOfWork::new(),
            date_generator: Box::new(|| PropertyValue::Date(Utc::now())),
            timestamps: TimestampConfig::default(),
            session_id,
        })
    }

    /// Build a manager whose timestamp settings come from configuration.
    pub fn from_config(store: S, registry: EntityRegistry, config: &MapperConfig) -> Result<Self> {
        Ok(Self::new(store, registry)?.with_timestamps(config.timestamps.clone()))
    }

    pub fn with_timestamps(mut self, timestamps: TimestampConfig) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Replace the clock used for timestamp properties. Takes effect from the
    /// next flush.
    pub fn set_date_generator<F, V>(&mut self, generator: F)
    where
        F: Fn() -> V + 'static,
        V: Into<PropertyValue>,
    {
        self.date_generator = Box::new(move || generator().into());
    }

    // ── Writes ────────────────────────────────────────────────────

    /// Queue `entity`, and everything reachable from it, for the next flush.
    pub fn persist<T: Entity>(&mut self, entity: &EntityRef<T>) -> Result<()> {
        let metadata = self.registry.metadata(T::NAME)?;
        metadata.identity()?;
        if self.unit_of_work.register(AnyEntity::new(entity)) {
            tracing::debug!(session = %self.session_id, entity = T::NAME, "Queued entity");
        }
        Ok(())
    }

    /// Write all pending work in one atomic batch.
    ///
    /// If the flush fails before the batch is applied, nothing is written and
    /// the pending work is kept, so the flush can be retried or the work
    /// discarded with [`clear`](Self::clear). Once the store has committed the
    /// batch the pending work is dropped, even if handing out ids fails.
    pub async fn flush(&mut self) -> Result<FlushSummary> {
        if !self.unit_of_work.has_pending() {
            return Ok(FlushSummary::default());
        }
        let span = tracing::debug_span!("flush", session = %self.session_id);
        self.flush_pending().instrument(span).await
    }

    async fn flush_pending(&mut self) -> Result<FlushSummary> {
        let plan = self.unit_of_work.plan(&self.registry)?;
        for entry in plan.created() {
            entry.entity.ensure_writable()?;
        }

        let mut existing = EdgeCounts::new();
        for (id, direction) in plan.edge_reads() {
            existing.add(self.store.get_edges(id, direction).await?);
        }

        let now = (self.date_generator)();
        let batch = plan.build_batch(&existing, &Stamps::new(&self.timestamps, now));
        let summary = FlushSummary {
            created: batch.created_count(),
            updated: batch.updated_count(),
            edges: batch.edges.len(),
        };

        let created = self.store.apply(&batch).await?;
        // The batch is committed from here on.
        self.unit_of_work.clear();
        if created.len() != summary.created {
            return Err(GraphError::InvalidBatch(format!(
                "store returned {} ids for {} created nodes",
                created.len(),
                summary.created
            ))
            .into());
        }
        self.track(&plan, &created)?;

        tracing::info!(
            session = %self.session_id,
            created = summary.created,
            updated = summary.updated,
            edges = summary.edges,
            "Flushed unit of work"
        );
        Ok(summary)
    }

    /// Hand out assigned ids and register every written entity. Every entity
    /// is visited even after a failure; the first error is returned.
    fn track(&mut self, plan: &FlushPlan, created: &[NodeId]) -> std::result::Result<(), MappingError> {
        let mut first_error = None;
        for (entry, id) in plan.created().zip(created) {
            match self.assign(&entry.entity, *id) {
                Ok(()) => {
                    self.identity.attach(*id, entry.entity.clone());
                }
                Err(err) => {
                    tracing::warn!(entity = entry.entity.name(), id = %id, error = %err, "Could not assign node id");
                    first_error.get_or_insert(err);
                }
            }
        }
        for entry in plan.updated() {
            if let Some(id) = entry.id {
                self.identity.attach(id, entry.entity.clone());
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn assign(&self, entity: &AnyEntity, id: NodeId) -> std::result::Result<(), MappingError> {
        let metadata = self.registry.metadata(entity.name())?;
        entity.set_property(metadata.identity()?, PropertyValue::Int(id.0))
    }

    // ── Reads ─────────────────────────────────────────────────────

    /// The `T` stored under `id`, or `None` if no such node exists.
    pub async fn find<T: Entity>(&mut self, id: NodeId) -> Result<Option<EntityRef<T>>> {
        self.registry.metadata(T::NAME)?;
        let Some(entity) = self.hydrator().load(id).await? else {
            return Ok(None);
        };
        let typed = entity.downcast::<T>().ok_or_else(|| MappingError::TypeMismatch {
            expected: T::NAME.to_string(),
            found: entity.name().to_string(),
        })?;
        Ok(Some(typed))
    }

    pub fn repository<T: Entity>(&mut self) -> Result<Repository<'_, S, T>> {
        self.registry.metadata(T::NAME)?;
        Ok(Repository::new(self))
    }

    pub fn create_query(&self, template: &str) -> GraphQuery<'_, S> {
        GraphQuery::new(&self.store, &self.registry, template)
    }

    pub(crate) fn hydrator(&mut self) -> Hydrator<'_, S> {
        Hydrator::new(&self.store, &self.registry, &mut self.identity)
    }

    // ── Session ───────────────────────────────────────────────────

    /// Whether `entity` is the instance this session tracks for its id.
    pub fn is_managed<T: Entity>(&self, entity: &EntityRef<T>) -> bool {
        let entity = AnyEntity::new(entity);
        self.identity
            .iter()
            .any(|tracked| tracked.same(&entity))
    }

    pub fn has_pending(&self) -> bool {
        self.unit_of_work.has_pending()
    }

    /// Forget every tracked entity and all pending work.
    pub fn clear(&mut self) {
        self.identity.clear();
        self.unit_of_work.clear();
        tracing::debug!(session = %self.session_id, "Cleared entity manager");
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
