//! medrag-vector
//!
//! Dense retriever: exact cosine search over chunk embeddings, incremental
//! insertion, and a checksummed JSON snapshot of the knowledge-base vectors.
pub mod dense;
pub mod snapshot;

pub use dense::DenseIndex;
pub use snapshot::{Payload, SCHEMA_VERSION};
