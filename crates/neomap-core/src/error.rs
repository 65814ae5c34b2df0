use thiserror::Error;

/// Errors raised by the mapping layer when entity data or metadata is invalid.
///
/// Store failures never appear here; they travel separately so callers can
/// tell "my data is invalid" apart from "the database is unreachable".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Type {type_name} is not a registered entity")]
    NotAnEntity { type_name: String },

    #[error("Entity {entity} declares no identity field")]
    MissingIdentity { entity: String },

    #[error("Entity {entity} exposes no accessor for field {field}")]
    FieldAccess { entity: String, field: String },

    #[error("Entity {entity} has no field named {field}")]
    UnknownField { entity: String, field: String },

    #[error("Field {field} of entity {entity} is not indexed")]
    UnindexedField { entity: String, field: String },

    #[error("Field {field} of entity {entity} is not a relation")]
    UnknownRelation { entity: String, field: String },

    #[error("Expected an entity of type {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid value for {entity}.{field}: expected {expected}, found {found}")]
    InvalidValue {
        entity: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("Entity {entity} is already borrowed")]
    EntityBorrowed { entity: String },

    #[error("Query binding {name} refers to an entity that has not been flushed")]
    UnpersistedBinding { name: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MappingError {
    pub fn field_access(entity: &str, field: &str) -> Self {
        Self::FieldAccess {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_value(entity: &str, field: &str, expected: &str, found: &str) -> Self {
        Self::InvalidValue {
            entity: entity.to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl From<config::ConfigError> for MappingError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
