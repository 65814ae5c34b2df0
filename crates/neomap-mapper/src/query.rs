//! Ad-hoc queries run straight through the store.

use neomap_core::{MappingError, PropertyMap, PropertyValue};
use neomap_graph::GraphStore;

use crate::entity::{AnyEntity, Entity, EntityRef};
use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::serializer::read_identity;

/// A query template plus its bindings.
///
/// Entities are bound as their node id, so they must have been flushed.
pub struct GraphQuery<'a, S: GraphStore> {
    store: &'a S,
    registry: &'a EntityRegistry,
    template: String,
    bindings: PropertyMap,
}

impl<'a, S: GraphStore> GraphQuery<'a, S> {
    pub(crate) fn new(store: &'a S, registry: &'a EntityRegistry, template: &str) -> Self {
        Self {
            store,
            registry,
            template: template.to_string(),
            bindings: PropertyMap::new(),
        }
    }

    pub fn set(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.bindings.insert(name.to_string(), value.into());
        self
    }

    pub fn set_entity<T: Entity>(mut self, name: &str, entity: &EntityRef<T>) -> std::result::Result<Self, MappingError> {
        let metadata = self.registry.metadata(T::NAME)?;
        let id = read_identity(&AnyEntity::new(entity), metadata)?.ok_or_else(|| {
            MappingError::UnpersistedBinding {
                name: name.to_string(),
            }
        })?;
        self.bindings.insert(name.to_string(), id.into());
        Ok(self)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn bindings(&self) -> &PropertyMap {
        &self.bindings
    }

    /// Every row, as a JSON object keyed by column.
    pub async fn rows(&self) -> Result<Vec<serde_json::Value>> {
        tracing::debug!(bindings = self.bindings.len(), "Running ad-hoc query");
        Ok(self.store.run_query(&self.template, &self.bindings).await?)
    }

    pub async fn one(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.rows().await?.into_iter().next())
    }
}
