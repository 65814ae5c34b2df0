//! Binds entity metadata to the Rust types that implement it.

use std::collections::BTreeMap;

use neomap_core::{EntityMetadata, MappingError, Schema};

use crate::entity::{AnyEntity, Entity};

type Factory = fn() -> AnyEntity;

fn instantiate<T: Entity>() -> AnyEntity {
    AnyEntity::new(&T::default().into_ref())
}

struct Registration {
    metadata: EntityMetadata,
    factory: Factory,
}

/// Metadata and constructors for every entity type a manager can handle.
#[derive(Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Registration>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with metadata declared in code.
    pub fn register<T: Entity>(&mut self, metadata: EntityMetadata) -> Result<&mut Self, MappingError> {
        if metadata.name != T::NAME {
            return Err(MappingError::InvalidSchema(format!(
                "metadata {} registered for entity type {}",
                metadata.name,
                T::NAME
            )));
        }
        metadata.validate()?;

        tracing::debug!(entity = T::NAME, fields = metadata.fields.len(), "Registered entity");
        self.entities.insert(
            T::NAME.to_string(),
            Registration {
                metadata,
                factory: instantiate::<T>,
            },
        );
        Ok(self)
    }

    /// Register `T` with the metadata the schema declares under `T::NAME`.
    pub fn bind<T: Entity>(&mut self, schema: &Schema) -> Result<&mut Self, MappingError> {
        let metadata = schema
            .get(T::NAME)
            .cloned()
            .ok_or_else(|| MappingError::NotAnEntity {
                type_name: T::NAME.to_string(),
            })?;
        self.register::<T>(metadata)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Entity>(mut self, metadata: EntityMetadata) -> Result<Self, MappingError> {
        self.register::<T>(metadata)?;
        Ok(self)
    }

    /// Check cross-entity invariants (relation targets are registered).
    pub fn validate(&self) -> Result<Schema, MappingError> {
        Schema::new(self.entities.values().map(|r| r.metadata.clone()).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn metadata(&self, name: &str) -> Result<&EntityMetadata, MappingError> {
        self.entities
            .get(name)
            .map(|r| &r.metadata)
            .ok_or_else(|| MappingError::NotAnEntity {
                type_name: name.to_string(),
            })
    }

    /// A fresh default instance of the entity named `name`.
    pub fn instantiate(&self, name: &str) -> Result<AnyEntity, MappingError> {
        self.entities
            .get(name)
            .map(|r| (r.factory)())
            .ok_or_else(|| MappingError::NotAnEntity {
                type_name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neomap_core::PropertyValue;

    #[derive(Debug, Default)]
    struct Note {
        id: Option<i64>,
    }

    impl Entity for Note {
        const NAME: &'static str = "Note";

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
    }

    fn note_metadata() -> EntityMetadata {
        EntityMetadata::builder("Note").identity("id").build().unwrap()
    }

    #[test]
    fn test_register_and_instantiate() {
        let registry = EntityRegistry::new().with::<Note>(note_metadata()).unwrap();
        assert!(registry.contains("Note"));
        let any = registry.instantiate("Note").unwrap();
        assert_eq!(any.name(), "Note");
        assert!(any.downcast::<Note>().is_some());
    }

    #[test]
    fn test_name_mismatch_rejected() {
        let metadata = EntityMetadata::builder("Memo").build().unwrap();
        assert!(matches!(
            EntityRegistry::new().with::<Note>(metadata),
            Err(MappingError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_unknown_entity() {
        let registry = EntityRegistry::new();
        assert_eq!(
            registry.metadata("Note").unwrap_err(),
            MappingError::NotAnEntity {
                type_name: "Note".to_string()
            }
        );
        assert!(registry.instantiate("Note").is_err());
    }

    #[test]
    fn test_bind_from_schema() {
        let schema = Schema::new(vec![note_metadata()]).unwrap();
        let mut registry = EntityRegistry::new();
        registry.bind::<Note>(&schema).unwrap();
        assert_eq!(registry.metadata("Note").unwrap().identity, Some("id".to_string()));
    }

    #[test]
    fn test_validate_catches_unregistered_target() {
        let metadata = EntityMetadata::builder("Note")
            .identity("id")
            .to_many("links", "Link")
            .build()
            .unwrap();
        let registry = EntityRegistry::new().with::<Note>(metadata).unwrap();
        assert!(matches!(
            registry.validate(),
            Err(MappingError::InvalidSchema(_))
        ));
    }
}
