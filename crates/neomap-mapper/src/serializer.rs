//! Turns one entity instance into the node properties and relation targets
//! a flush writes for it.

use neomap_core::{
    Direction, EntityMetadata, FieldKind, FieldSpec, MappingError, NodeId, PropertyMap, PropertyValue,
};

use crate::entity::AnyEntity;

/// Targets of one writable relation field, in field order.
#[derive(Debug, Clone)]
pub struct SerializedRelation {
    pub field: String,
    pub label: String,
    pub direction: Direction,
    pub targets: Vec<AnyEntity>,
}

#[derive(Debug, Clone)]
pub struct SerializedEntity {
    pub entity: AnyEntity,
    pub label: String,
    /// `None` until the entity's first successful flush.
    pub id: Option<NodeId>,
    pub properties: PropertyMap,
    pub relations: Vec<SerializedRelation>,
}

impl SerializedEntity {
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

/// Current database id held by the entity's identity field.
pub fn read_identity(entity: &AnyEntity, metadata: &EntityMetadata) -> Result<Option<NodeId>, MappingError> {
    let identity = metadata.identity()?;
    let value = entity
        .property(identity)?
        .ok_or_else(|| MappingError::field_access(&metadata.name, identity))?;
    match value {
        PropertyValue::Null => Ok(None),
        PropertyValue::Int(id) => Ok(Some(NodeId(id))),
        other => Err(MappingError::invalid_value(
            &metadata.name,
            identity,
            "int",
            other.type_name(),
        )),
    }
}

pub fn serialize(entity: &AnyEntity, metadata: &EntityMetadata) -> Result<SerializedEntity, MappingError> {
    let id = read_identity(entity, metadata)?;

    let mut properties = PropertyMap::new();
    for field in metadata.property_fields().filter(|f| f.is_writable()) {
        let value = entity
            .property(&field.name)?
            .ok_or_else(|| MappingError::field_access(&metadata.name, &field.name))?;
        properties.insert(field.name.clone(), storage_value(metadata, field, value)?);
    }

    let mut relations = Vec::new();
    for field in metadata.relation_fields().filter(|f| f.is_writable()) {
        let targets = entity
            .relation(&field.name)?
            .ok_or_else(|| MappingError::field_access(&metadata.name, &field.name))?;
        check_targets(metadata, field, &targets)?;
        relations.push(SerializedRelation {
            field: field.name.clone(),
            label: field.label().to_string(),
            direction: field.direction,
            targets,
        });
    }

    Ok(SerializedEntity {
        entity: entity.clone(),
        label: metadata.name.clone(),
        id,
        properties,
        relations,
    })
}

fn storage_value(metadata: &EntityMetadata, field: &FieldSpec, value: PropertyValue) -> Result<PropertyValue, MappingError> {
    if field.kind == FieldKind::Date && !value.is_null() && value.as_date().is_none() {
        return Err(MappingError::invalid_value(
            &metadata.name,
            &field.name,
            "date",
            value.type_name(),
        ));
    }
    Ok(value.to_storage())
}

fn check_targets(metadata: &EntityMetadata, field: &FieldSpec, targets: &[AnyEntity]) -> Result<(), MappingError> {
    if field.kind == FieldKind::ToOne && targets.len() > 1 {
        return Err(MappingError::invalid_value(
            &metadata.name,
            &field.name,
            "at most one target",
            &format!("{} targets", targets.len()),
        ));
    }
    let expected = field.target.as_deref().unwrap_or_default();
    match targets.iter().find(|t| t.name() != expected) {
        Some(wrong) => Err(MappingError::TypeMismatch {
            expected: expected.to_string(),
            found: wrong.name().to_string(),
        }),
        None => Ok(()),
    }
}
