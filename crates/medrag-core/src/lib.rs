#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod knowledge;
pub mod material;
pub mod patient;
pub mod signals;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use knowledge::KnowledgeBase;
pub use material::{FallbackTable, MaterialType};
pub use signals::{KeywordTable, PatientSignals};
pub use types::{Chunk, ChunkId, ChunkSource, RetrievalResult, RetrieverOrigin, Scope, SearchHit};
