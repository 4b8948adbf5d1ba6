//! medrag-text
//!
//! Keyword (BM25) retriever over the chunk corpus, backed by an in-RAM
//! tantivy index that is rebuilt and swapped whenever the corpus changes.
pub mod tantivy_utils;
pub mod index;

pub use index::SparseIndex;
