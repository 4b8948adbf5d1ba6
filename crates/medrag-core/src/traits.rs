use crate::types::{Scope, SearchHit};

/// Text → vector backend. Implementations return L2-normalized vectors of
/// `dim()` entries, one per input, in input order.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the backend/model (e.g. `bert:all-MiniLM-L6-v2:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A ranked retriever over the shared chunk set.
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;
    /// Up to `k` hits visible in `scope`, best first, ties in corpus order.
    fn search(&self, query: &str, k: usize, scope: &Scope) -> crate::error::Result<Vec<SearchHit>>;
}
