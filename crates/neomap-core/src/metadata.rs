//! Entity metadata: which fields of an entity are persisted and how.
//!
//! Metadata is plain data, built once at startup either in code through
//! [`MetadataBuilder`] or deserialized from configuration, then validated
//! into a [`Schema`]. The mapping engine only ever reads it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

pub use crate::types::Direction;
use crate::error::MappingError;

// ── Field Declarations ────────────────────────────────────────────

/// What a field holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Scalar,
    Date,
    ToOne,
    ToMany,
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::ToOne | Self::ToMany)
    }
}

/// Whether a field takes part in writes, reads, or both.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    ReadWrite,
    /// Hydrated from the graph, never serialized.
    ReadOnly,
    /// Serialized to the graph, never hydrated.
    WriteOnly,
}

/// Declaration of one persistent field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub visibility: Visibility,
    /// Entity type at the other end of a relation.
    #[serde(default)]
    pub target: Option<String>,
    /// Edge label; defaults to the field name.
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, target: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            indexed: false,
            visibility: Visibility::ReadWrite,
            target: target.map(str::to_string),
            relation: None,
            direction: Direction::Outgoing,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::new(name, FieldKind::Scalar, None)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldKind::Date, None)
    }

    pub fn to_one(name: &str, target: &str) -> Self {
        Self::new(name, FieldKind::ToOne, Some(target))
    }

    pub fn to_many(name: &str, target: &str) -> Self {
        Self::new(name, FieldKind::ToMany, Some(target))
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.visibility = Visibility::ReadOnly;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.visibility = Visibility::WriteOnly;
        self
    }

    /// Use `label` for the edge instead of the field name.
    pub fn relation(mut self, label: &str) -> Self {
        self.relation = Some(label.to_string());
        self
    }

    /// Read and write the relation as edges pointing at this entity.
    pub fn incoming(mut self) -> Self {
        self.direction = Direction::Incoming;
        self
    }

    /// Edge label used for this relation.
    pub fn label(&self) -> &str {
        self.relation.as_deref().unwrap_or(&self.name)
    }

    pub fn is_relation(&self) -> bool {
        self.kind.is_relation()
    }

    /// Populated during hydration.
    pub fn is_readable(&self) -> bool {
        self.visibility != Visibility::WriteOnly
    }

    /// Included when serializing.
    pub fn is_writable(&self) -> bool {
        self.visibility != Visibility::ReadOnly
    }

    fn validate(&self, entity: &str) -> Result<(), MappingError> {
        let invalid = |msg: String| Err(MappingError::InvalidSchema(format!("{entity}.{}: {msg}", self.name)));

        if !is_identifier(&self.name) {
            return invalid("field name is not a valid identifier".to_string());
        }
        if self.is_relation() {
            if self.target.is_none() {
                return invalid("relation has no target entity".to_string());
            }
            if self.indexed {
                return invalid("relations cannot be indexed".to_string());
            }
            if !is_identifier(self.label()) {
                return invalid(format!("relation label {} is not a valid identifier", self.label()));
            }
        } else if self.target.is_some()
            || self.relation.is_some()
            || self.direction != Direction::Outgoing
        {
            return invalid("scalar fields cannot declare a target, relation or direction".to_string());
        }
        Ok(())
    }
}

// ── Entity Metadata ───────────────────────────────────────────────

/// Persistent shape of one entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Entity name, also the node label.
    pub name: String,
    /// Field holding the database id.
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl EntityMetadata {
    pub fn builder(name: &str) -> MetadataBuilder {
        MetadataBuilder {
            metadata: EntityMetadata {
                name: name.to_string(),
                identity: None,
                fields: Vec::new(),
            },
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the identity field, or `MissingIdentity`.
    pub fn identity(&self) -> Result<&str, MappingError> {
        self.identity
            .as_deref()
            .ok_or_else(|| MappingError::MissingIdentity {
                entity: self.name.clone(),
            })
    }

    /// Scalar and date fields, in declaration order.
    pub fn property_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    /// Relation fields, in declaration order.
    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    /// Resolve a field for an exact-match lookup.
    ///
    /// Undeclared fields and declared-but-unindexed fields are rejected with
    /// distinct errors so no query is ever issued for them.
    pub fn lookup_field(&self, name: &str) -> Result<&FieldSpec, MappingError> {
        let field = self.field(name).ok_or_else(|| MappingError::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
        })?;
        if !field.indexed {
            return Err(MappingError::UnindexedField {
                entity: self.name.clone(),
                field: name.to_string(),
            });
        }
        Ok(field)
    }

    /// Check names and per-field invariants.
    pub fn validate(&self) -> Result<(), MappingError> {
        if !is_identifier(&self.name) {
            return Err(MappingError::InvalidSchema(format!(
                "entity name {} is not a valid identifier",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        if let Some(identity) = &self.identity {
            if !is_identifier(identity) {
                return Err(MappingError::InvalidSchema(format!(
                    "{}: identity {identity} is not a valid identifier",
                    self.name
                )));
            }
            seen.insert(identity.as_str());
        }

        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(MappingError::InvalidSchema(format!(
                    "{}: field {} declared twice",
                    self.name, field.name
                )));
            }
            field.validate(&self.name)?;
        }
        Ok(())
    }
}

/// Builder for [`EntityMetadata`].
///
/// ```
/// # use neomap_core::{EntityMetadata, FieldSpec};
/// let movie = EntityMetadata::builder("Movie")
///     .identity("id")
///     .scalar("title")
///     .indexed("code")
///     .field(FieldSpec::to_many("actors", "Person"))
///     .build()
///     .unwrap();
/// assert!(movie.lookup_field("code").is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    metadata: EntityMetadata,
}

impl MetadataBuilder {
    pub fn identity(mut self, name: &str) -> Self {
        self.metadata.identity = Some(name.to_string());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.metadata.fields.push(field);
        self
    }

    pub fn scalar(self, name: &str) -> Self {
        self.field(FieldSpec::scalar(name))
    }

    pub fn indexed(self, name: &str) -> Self {
        self.field(FieldSpec::scalar(name).indexed())
    }

    pub fn date(self, name: &str) -> Self {
        self.field(FieldSpec::date(name))
    }

    pub fn to_one(self, name: &str, target: &str) -> Self {
        self.field(FieldSpec::to_one(name, target))
    }

    pub fn to_many(self, name: &str, target: &str) -> Self {
        self.field(FieldSpec::to_many(name, target))
    }

    pub fn build(self) -> Result<EntityMetadata, MappingError> {
        self.metadata.validate()?;
        Ok(self.metadata)
    }
}

// ── Schema ────────────────────────────────────────────────────────

/// A validated, closed set of entity declarations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<String, EntityMetadata>,
}

impl Schema {
    /// Validate every entity, name uniqueness, and relation targets.
    pub fn new(entities: Vec<EntityMetadata>) -> Result<Self, MappingError> {
        let mut map = BTreeMap::new();
        for metadata in entities {
            metadata.validate()?;
            if map.contains_key(&metadata.name) {
                return Err(MappingError::InvalidSchema(format!(
                    "entity {} declared twice",
                    metadata.name
                )));
            }
            map.insert(metadata.name.clone(), metadata);
        }

        for metadata in map.values() {
            for field in metadata.relation_fields() {
                let target = field.target.as_deref().unwrap_or_default();
                if !map.contains_key(target) {
                    return Err(MappingError::InvalidSchema(format!(
                        "{}.{} targets undeclared entity {target}",
                        metadata.name, field.name
                    )));
                }
            }
        }

        Ok(Self { entities: map })
    }

    pub fn get(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into Cypher between backticks.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> EntityMetadata {
        EntityMetadata::builder("Movie")
            .identity("id")
            .scalar("title")
            .indexed("movie_registry_code")
            .date("release_date")
            .to_many("actors", "Person")
            .to_one("main_actor", "Person")
            .field(
                FieldSpec::to_many("cinemas", "Cinema")
                    .read_only()
                    .incoming()
                    .relation("presented_movies"),
            )
            .build()
            .unwrap()
    }

    fn person() -> EntityMetadata {
        EntityMetadata::builder("Person")
            .identity("id")
            .scalar("first_name")
            .build()
            .unwrap()
    }

    fn cinema() -> EntityMetadata {
        EntityMetadata::builder("Cinema")
            .identity("id")
            .scalar("name")
            .to_many("presented_movies", "Movie")
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_field_distinguishes_unknown_and_unindexed() {
        let m = movie();
        assert!(m.lookup_field("movie_registry_code").is_ok());
        assert!(matches!(
            m.lookup_field("movie_registration_code"),
            Err(MappingError::UnknownField { .. })
        ));
        assert!(matches!(
            m.lookup_field("title"),
            Err(MappingError::UnindexedField { .. })
        ));
    }

    #[test]
    fn test_relation_label_defaults_to_field_name() {
        let m = movie();
        assert_eq!(m.field("actors").unwrap().label(), "actors");
        assert_eq!(m.field("cinemas").unwrap().label(), "presented_movies");
        assert_eq!(m.field("cinemas").unwrap().direction, Direction::Incoming);
    }

    #[test]
    fn test_visibility_flags() {
        let read_only = FieldSpec::to_many("a", "B").read_only();
        assert!(read_only.is_readable());
        assert!(!read_only.is_writable());

        let write_only = FieldSpec::to_many("a", "B").write_only();
        assert!(!write_only.is_readable());
        assert!(write_only.is_writable());
    }

    #[test]
    fn test_missing_identity_is_reported() {
        let m = EntityMetadata::builder("Failed").scalar("name").build().unwrap();
        assert_eq!(
            m.identity(),
            Err(MappingError::MissingIdentity {
                entity: "Failed".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = EntityMetadata::builder("Movie")
            .identity("id")
            .scalar("id")
            .build();
        assert!(matches!(result, Err(MappingError::InvalidSchema(_))));
    }

    #[test]
    fn test_indexed_relation_rejected() {
        let result = EntityMetadata::builder("Movie")
            .field(FieldSpec::to_many("actors", "Person").indexed())
            .build();
        assert!(matches!(result, Err(MappingError::InvalidSchema(_))));
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        assert!(EntityMetadata::builder("Movie`) DETACH DELETE")
            .build()
            .is_err());
        assert!(is_identifier("creationDate"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_schema_checks_relation_targets() {
        assert!(Schema::new(vec![movie(), person(), cinema()]).is_ok());
        let result = Schema::new(vec![movie(), person()]);
        assert!(matches!(result, Err(MappingError::InvalidSchema(_))));
    }

    #[test]
    fn test_schema_rejects_duplicate_entities() {
        let result = Schema::new(vec![person(), person()]);
        assert!(matches!(result, Err(MappingError::InvalidSchema(_))));
    }

    #[test]
    fn test_metadata_deserializes_with_defaults() {
        let json = r#"{
            "name": "Cinema",
            "identity": "id",
            "fields": [
                {"name": "name"},
                {"name": "rejected_movies", "kind": "to_many", "target": "Movie", "visibility": "write_only"}
            ]
        }"#;
        let m: EntityMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(m.fields[0].kind, FieldKind::Scalar);
        assert_eq!(m.fields[1].visibility, Visibility::WriteOnly);
        assert_eq!(m.fields[1].direction, Direction::Outgoing);
        assert!(m.validate().is_ok());
    }
}
