use neomap_core::MappingError;
use neomap_graph::GraphError;
use thiserror::Error;

/// Everything a mapper operation can fail with.
///
/// Mapping errors mean the entities or metadata are invalid and nothing was
/// written. Graph errors come from the store untouched.
#[derive(Error, Debug)]
pub enum MapperError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl MapperError {
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&MappingError> {
        match self {
            Self::Mapping(e) => Some(e),
            Self::Graph(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
