//! Entities: application types that map one-to-one onto graph nodes.
//!
//! An entity exposes its persistent fields by name through the [`Entity`]
//! trait; which names exist and what they mean is declared separately in
//! its [`EntityMetadata`](neomap_core::EntityMetadata). Instances are shared
//! as [`EntityRef`]s so object graphs may contain cycles, and the engine
//! handles them type-erased as [`AnyEntity`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use neomap_core::{MappingError, PropertyValue};

/// Shared, mutable handle to an entity instance.
pub type EntityRef<T> = Rc<RefCell<T>>;

/// A persistable application type.
///
/// ```
/// use neomap_core::{MappingError, PropertyValue};
/// use neomap_mapper::{AnyEntity, Entity};
///
/// #[derive(Default)]
/// struct Person {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Entity for Person {
///     const NAME: &'static str = "Person";
///
///     fn property(&self, field: &str) -> Option<PropertyValue> {
///         match field {
///             "id" => Some(self.id.into()),
///             "name" => Some(self.name.as_str().into()),
///             _ => None,
///         }
///     }
///
///     fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
///         match field {
///             "id" => self.id = value.extract(Self::NAME, field)?,
///             "name" => self.name = value.extract(Self::NAME, field)?,
///             _ => return Err(MappingError::field_access(Self::NAME, field)),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Entity: Default + 'static {
    /// Entity name; matches the metadata name and the node label.
    const NAME: &'static str;

    /// Current value of a scalar, date or identity field.
    /// `None` means the entity has no such field.
    fn property(&self, field: &str) -> Option<PropertyValue>;

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError>;

    /// Current targets of a relation field, in order. A to-one relation
    /// yields zero or one target. `None` means the entity has no such field.
    fn relation(&self, _field: &str) -> Option<Vec<AnyEntity>> {
        None
    }

    fn set_relation(&mut self, field: &str, _targets: Vec<AnyEntity>) -> Result<(), MappingError> {
        Err(MappingError::UnknownRelation {
            entity: Self::NAME.to_string(),
            field: field.to_string(),
        })
    }

    /// Wrap into a shared handle.
    fn into_ref(self) -> EntityRef<Self> {
        Rc::new(RefCell::new(self))
    }
}

// ── Type Erasure ──────────────────────────────────────────────────

trait ErasedEntity {
    fn name(&self) -> &'static str;
    fn property(&self, field: &str) -> Result<Option<PropertyValue>, MappingError>;
    fn set_property(&self, field: &str, value: PropertyValue) -> Result<(), MappingError>;
    fn relation(&self, field: &str) -> Result<Option<Vec<AnyEntity>>, MappingError>;
    fn set_relation(&self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError>;
    fn writable(&self) -> Result<(), MappingError>;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

fn borrowed<T: Entity>() -> MappingError {
    MappingError::EntityBorrowed {
        entity: T::NAME.to_string(),
    }
}

impl<T: Entity> ErasedEntity for RefCell<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn property(&self, field: &str) -> Result<Option<PropertyValue>, MappingError> {
        let entity = self.try_borrow().map_err(|_| borrowed::<T>())?;
        Ok(entity.property(field))
    }

    fn set_property(&self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        let mut entity = self.try_borrow_mut().map_err(|_| borrowed::<T>())?;
        entity.set_property(field, value)
    }

    fn relation(&self, field: &str) -> Result<Option<Vec<AnyEntity>>, MappingError> {
        let entity = self.try_borrow().map_err(|_| borrowed::<T>())?;
        Ok(entity.relation(field))
    }

    fn set_relation(&self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError> {
        let mut entity = self.try_borrow_mut().map_err(|_| borrowed::<T>())?;
        entity.set_relation(field, targets)
    }

    fn writable(&self) -> Result<(), MappingError> {
        self.try_borrow_mut().map(drop).map_err(|_| borrowed::<T>())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// A type-erased entity handle. Clones point at the same instance.
#[derive(Clone)]
pub struct AnyEntity(Rc<dyn ErasedEntity>);

impl AnyEntity {
    pub fn new<T: Entity>(entity: &EntityRef<T>) -> Self {
        let erased: Rc<dyn ErasedEntity> = entity.clone();
        Self(erased)
    }

    /// Entity name of the underlying type.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Recover the typed handle, if the instance is a `T`.
    pub fn downcast<T: Entity>(&self) -> Option<EntityRef<T>> {
        self.0.clone().into_any().downcast::<RefCell<T>>().ok()
    }

    /// Whether both handles point at the same instance.
    pub fn same(&self, other: &AnyEntity) -> bool {
        self.key() == other.key()
    }

    /// Instance address, stable for the lifetime of the instance.
    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn property(&self, field: &str) -> Result<Option<PropertyValue>, MappingError> {
        self.0.property(field)
    }

    pub fn set_property(&self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        self.0.set_property(field, value)
    }

    pub fn relation(&self, field: &str) -> Result<Option<Vec<AnyEntity>>, MappingError> {
        self.0.relation(field)
    }

    pub fn set_relation(&self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError> {
        self.0.set_relation(field, targets)
    }

    /// Fails with `EntityBorrowed` while any borrow of the instance is held.
    pub fn ensure_writable(&self) -> Result<(), MappingError> {
        self.0.writable()
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyEntity({}@{:#x})", self.name(), self.key())
    }
}

impl<T: Entity> From<&EntityRef<T>> for AnyEntity {
    fn from(entity: &EntityRef<T>) -> Self {
        Self::new(entity)
    }
}

// ── Relation Helpers ──────────────────────────────────────────────
//
// Used by `Entity` implementations to move typed relation fields in and out
// of the erased form.

/// Erase a to-many relation field.
pub fn many<T: Entity>(targets: &[EntityRef<T>]) -> Vec<AnyEntity> {
    targets.iter().map(AnyEntity::new).collect()
}

/// Erase a to-one relation field.
pub fn one<T: Entity>(target: &Option<EntityRef<T>>) -> Vec<AnyEntity> {
    target.iter().map(AnyEntity::new).collect()
}

/// Restore a to-many relation field.
pub fn typed_many<T: Entity>(targets: Vec<AnyEntity>) -> Result<Vec<EntityRef<T>>, MappingError> {
    targets.iter().map(typed::<T>).collect()
}

/// Restore a to-one relation field; the last target wins.
pub fn typed_one<T: Entity>(targets: Vec<AnyEntity>) -> Result<Option<EntityRef<T>>, MappingError> {
    targets.last().map(typed::<T>).transpose()
}

fn typed<T: Entity>(target: &AnyEntity) -> Result<EntityRef<T>, MappingError> {
    target.downcast::<T>().ok_or_else(|| MappingError::TypeMismatch {
        expected: T::NAME.to_string(),
        found: target.name().to_string(),
    })
}
