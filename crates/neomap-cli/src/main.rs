//! CLI entry point for inspecting a neomap schema and the graph behind it.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use neomap_core::config::MapperConfig;
use neomap_core::{Direction, NodeId, PropertyValue, Schema};
use neomap_graph::{GraphClient, GraphConfig, GraphStore};

#[derive(Parser)]
#[command(name = "neomap")]
#[command(about = "Inspect neomap entity schemas and the Neo4j graph they map to")]
struct Cli {
    /// Config file prefix (default: neomap).
    #[arg(short, long, default_value = "neomap", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configured entity schema.
    Check,

    /// Find nodes of an entity by one of its indexed fields.
    Lookup {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        field: String,
        /// Parsed as an integer, float or boolean when possible.
        #[arg(long)]
        value: String,
    },

    /// Print a node and the edges touching it.
    Node {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mapper_config = MapperConfig::load(&cli.config)?;

    match cli.command {
        Command::Check => {
            let schema = mapper_config.schema()?;
            summarize(&schema);
        }
        Command::Lookup {
            entity,
            field,
            value,
        } => {
            let schema = mapper_config.schema()?;
            let metadata = schema
                .get(&entity)
                .ok_or_else(|| anyhow::anyhow!("Entity {entity} is not declared in the schema"))?;
            metadata.lookup_field(&field)?;

            let graph = GraphClient::connect(&load_graph_config(&cli.config)).await?;
            let records = graph
                .lookup_by_index(&metadata.name, &field, &parse_value(&value))
                .await?;
            tracing::info!(entity = %entity, field = %field, matches = records.len(), "Lookup finished");
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Node { id } => {
            let graph = GraphClient::connect(&load_graph_config(&cli.config)).await?;
            let id = NodeId(id);
            let node = graph
                .get_node(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Node {id} not found"))?;
            let outgoing = graph.get_edges(id, Direction::Outgoing).await?;
            let incoming = graph.get_edges(id, Direction::Incoming).await?;

            let out = serde_json::json!({
                "node": node,
                "outgoing": outgoing,
                "incoming": incoming,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

fn summarize(schema: &Schema) {
    for metadata in schema.iter() {
        let indexed: Vec<&str> = metadata
            .property_fields()
            .filter(|f| f.indexed)
            .map(|f| f.name.as_str())
            .collect();
        tracing::info!(
            entity = %metadata.name,
            identity = metadata.identity.as_deref().unwrap_or("-"),
            properties = metadata.property_fields().count(),
            relations = metadata.relation_fields().count(),
            indexed = ?indexed,
            "Entity"
        );
        if metadata.identity.is_none() {
            tracing::warn!(entity = %metadata.name, "Entity declares no identity and cannot be persisted");
        }
    }
    tracing::info!(entities = schema.len(), "Schema is valid");
}

fn parse_value(raw: &str) -> PropertyValue {
    if let Ok(i) = raw.parse::<i64>() {
        return PropertyValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return PropertyValue::Float(f);
    }
    match raw {
        "true" => PropertyValue::Bool(true),
        "false" => PropertyValue::Bool(false),
        _ => PropertyValue::String(raw.to_string()),
    }
}

fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NEOMAP")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match cfg {
        Ok(c) => c.get::<GraphConfig>("neo4j").unwrap_or_default(),
        Err(_) => GraphConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), PropertyValue::Int(42));
        assert_eq!(parse_value("2.5"), PropertyValue::Float(2.5));
        assert_eq!(parse_value("true"), PropertyValue::Bool(true));
        assert_eq!(parse_value("rotk-2003"), PropertyValue::from("rotk-2003"));
    }

    #[test]
    fn test_cli_parses_lookup() {
        let cli = Cli::parse_from([
            "neomap",
            "--config",
            "custom",
            "lookup",
            "--entity",
            "Movie",
            "--field",
            "movie_registry_code",
            "--value",
            "rotk-2003",
        ]);
        assert_eq!(cli.config, "custom");
        match cli.command {
            Command::Lookup { entity, field, value } => {
                assert_eq!(entity, "Movie");
                assert_eq!(field, "movie_registry_code");
                assert_eq!(value, "rotk-2003");
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let graph = load_graph_config("/nonexistent/neomap");
        assert_eq!(graph.uri, "bolt://localhost:7687");
    }
}
