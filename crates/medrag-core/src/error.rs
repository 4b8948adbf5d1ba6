use thiserror::Error;

/// Failures along the retrieval path.
///
/// Everything except `InvalidConfig` and `Io` is recoverable by stepping one
/// level down the fallback chain (dense → sparse → static table).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Failed to load index: {0}")]
    IndexLoad(String),

    #[error("Failed to build index: {0}")]
    IndexBuild(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unknown material type: {0}")]
    UnknownMaterialType(String),

    #[error("No retriever produced results")]
    RetrievalExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
