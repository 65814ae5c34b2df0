//! Typed finders over one entity type.

use std::marker::PhantomData;

use neomap_core::{MappingError, NodeId, NodeRecord, PropertyValue};
use neomap_graph::GraphStore;

use crate::entity::{Entity, EntityRef};
use crate::error::Result;
use crate::manager::EntityManager;

/// Finder for entities of type `T`, borrowed from an [`EntityManager`].
///
/// Lookups go through the manager's identity map, so an entity found here is
/// the same instance `find` or an earlier lookup returned.
pub struct Repository<'a, S: GraphStore, T: Entity> {
    manager: &'a mut EntityManager<S>,
    marker: PhantomData<T>,
}

impl<'a, S: GraphStore, T: Entity> Repository<'a, S, T> {
    pub(crate) fn new(manager: &'a mut EntityManager<S>) -> Self {
        Self {
            manager,
            marker: PhantomData,
        }
    }

    /// All entities whose indexed `field` equals `value`.
    ///
    /// Fails without touching the store if `field` is undeclared or not
    /// indexed.
    pub async fn find_by(&mut self, field: &str, value: impl Into<PropertyValue>) -> Result<Matches<T>> {
        let value = value.into().to_storage();
        let metadata = self.manager.registry().metadata(T::NAME)?;
        metadata.lookup_field(field)?;

        let records = self
            .manager
            .store()
            .lookup_by_index(&metadata.name, field, &value)
            .await?;
        tracing::debug!(entity = T::NAME, field, matches = records.len(), "Index lookup");
        self.hydrate_all(records).await
    }

    /// First entity whose indexed `field` equals `value`.
    pub async fn find_one_by(&mut self, field: &str, value: impl Into<PropertyValue>) -> Result<Option<EntityRef<T>>> {
        Ok(self.find_by(field, value).await?.into_first())
    }

    /// Every stored entity of this type, in node id order.
    pub async fn find_all(&mut self) -> Result<Matches<T>> {
        let metadata = self.manager.registry().metadata(T::NAME)?;
        let records = self.manager.store().nodes_by_label(&metadata.name).await?;
        self.hydrate_all(records).await
    }

    pub async fn find(&mut self, id: NodeId) -> Result<Option<EntityRef<T>>> {
        self.manager.find::<T>(id).await
    }

    async fn hydrate_all(&mut self, records: Vec<NodeRecord>) -> Result<Matches<T>> {
        let mut hydrator = self.manager.hydrator();
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let entity = hydrator.hydrate(record).await?;
            let typed = entity.downcast::<T>().ok_or_else(|| MappingError::TypeMismatch {
                expected: T::NAME.to_string(),
                found: entity.name().to_string(),
            })?;
            items.push(typed);
        }
        Ok(Matches { items })
    }
}

/// Result set of a repository lookup. Iterable any number of times.
#[derive(Debug)]
pub struct Matches<T> {
    items: Vec<EntityRef<T>>,
}

impl<T> Matches<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&EntityRef<T>> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&EntityRef<T>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityRef<T>> {
        self.items.iter()
    }

    pub fn into_first(self) -> Option<EntityRef<T>> {
        self.items.into_iter().next()
    }

    pub fn into_vec(self) -> Vec<EntityRef<T>> {
        self.items
    }
}

impl<T> IntoIterator for Matches<T> {
    type Item = EntityRef<T>;
    type IntoIter = std::vec::IntoIter<EntityRef<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'m, T> IntoIterator for &'m Matches<T> {
    type Item = &'m EntityRef<T>;
    type IntoIter = std::slice::Iter<'m, EntityRef<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
