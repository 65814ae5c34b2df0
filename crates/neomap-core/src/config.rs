//! Configuration management for neomap.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`NEOMAP_` prefix, `__` between sections,
//!    e.g. `NEOMAP_TIMESTAMPS__UPDATE_PROPERTY`)
//! 2. Config file (`neomap.toml` by default)
//! 3. Defaults
//!
//! The `[neo4j]` section is read by the graph client; this module covers the
//! mapper settings and the `[[entities]]` schema declarations.

use serde::Deserialize;

use crate::error::MappingError;
use crate::metadata::{is_identifier, EntityMetadata, Schema};

/// Mapper-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapperConfig {
    /// Automatic node/edge timestamps.
    #[serde(default)]
    pub timestamps: TimestampConfig,

    /// Entity declarations, validated into a [`Schema`] by [`MapperConfig::schema`].
    #[serde(default)]
    pub entities: Vec<EntityMetadata>,
}

/// Names of the properties written by every flush.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimestampConfig {
    /// Whether flushes write timestamp properties at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Written once, when a node or edge is created.
    #[serde(default = "default_creation_property")]
    pub creation_property: String,

    /// Written on every node write.
    #[serde(default = "default_update_property")]
    pub update_property: String,
}

fn default_true() -> bool {
    true
}

fn default_creation_property() -> String {
    "creationDate".to_string()
}

fn default_update_property() -> String {
    "updateDate".to_string()
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            creation_property: default_creation_property(),
            update_property: default_update_property(),
        }
    }
}

impl TimestampConfig {
    pub fn validate(&self) -> Result<(), MappingError> {
        for name in [&self.creation_property, &self.update_property] {
            if !is_identifier(name) {
                return Err(MappingError::Config(format!(
                    "timestamp property {name} is not a valid identifier"
                )));
            }
        }
        Ok(())
    }
}

impl MapperConfig {
    /// Load from `{file_prefix}.toml` (optional) and `NEOMAP_*` variables.
    pub fn load(file_prefix: &str) -> Result<Self, MappingError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("NEOMAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: MapperConfig = cfg.try_deserialize()?;
        loaded.timestamps.validate()?;

        tracing::debug!(
            entities = loaded.entities.len(),
            timestamps = loaded.timestamps.enabled,
            "Loaded mapper configuration"
        );
        Ok(loaded)
    }

    /// Validate the declared entities into a schema.
    pub fn schema(&self) -> Result<Schema, MappingError> {
        Schema::new(self.entities.clone())
    }
}
