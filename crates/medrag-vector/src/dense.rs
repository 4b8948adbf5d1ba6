use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use medrag_core::error::{Error, Result};
use medrag_core::traits::{Embedder, Retriever};
use medrag_core::types::{Chunk, Scope, SearchHit};

pub(crate) struct State {
    pub(crate) chunks: Vec<Chunk>,
    pub(crate) vectors: Vec<Vec<f32>>,
}

/// Exact nearest-neighbour index over L2-normalised chunk embeddings.
///
/// Entries are kept in insertion (corpus) order; queries scan every visible
/// entry under a read lock.
pub struct DenseIndex {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    pub(crate) state: RwLock<State>,
}

impl DenseIndex {
    pub fn build(chunks: &[Chunk], embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        Self::build_with_progress(chunks, embedder, batch_size, |_| {})
    }

    /// Like `build`, calling `on_progress` with the number of chunks embedded
    /// so far after each batch.
    pub fn build_with_progress<F>(chunks: &[Chunk], embedder: Arc<dyn Embedder>, batch_size: usize, on_progress: F) -> Result<Self>
    where
        F: FnMut(usize),
    {
        if chunks.is_empty() {
            return Err(Error::IndexBuild("dense index needs at least one chunk".into()));
        }
        let start = Instant::now();
        let batch_size = batch_size.max(1);
        let vectors = embed_chunks(embedder.as_ref(), chunks, batch_size, on_progress)?;
        tracing::info!(
            chunks = chunks.len(),
            embedder = embedder.id(),
            dim = embedder.dim(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dense index built"
        );
        Ok(Self::from_parts(embedder, batch_size, chunks.to_vec(), vectors))
    }

    pub(crate) fn from_parts(embedder: Arc<dyn Embedder>, batch_size: usize, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Self {
        Self { embedder, batch_size, state: RwLock::new(State { chunks, vectors }) }
    }

    /// Embed and append `chunks`. Vectors are computed before the write lock
    /// is taken; on any failure the index is left unchanged.
    pub fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let vectors = embed_chunks(self.embedder.as_ref(), chunks, self.batch_size, |_| {})?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.chunks.extend_from_slice(chunks);
        state.vectors.extend(vectors);
        tracing::info!(added = chunks.len(), total = state.chunks.len(), "dense index extended");
        Ok(())
    }

    /// Up to `k` visible chunks by cosine similarity, highest first, ties in
    /// corpus order.
    pub fn query(&self, text: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = embed_texts(self.embedder.as_ref(), &[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("embedder returned no query vector".into()))?;

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, f32)> = state
            .chunks
            .iter()
            .zip(&state.vectors)
            .enumerate()
            .filter(|(_, (chunk, _))| chunk.is_visible_in(scope))
            .map(|(position, (_, vector))| (position, dot(&query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(position, score)| SearchHit { chunk: state.chunks[position].clone(), score })
            .collect();
        tracing::debug!(k, hits = hits.len(), "dense query");
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl fmt::Debug for DenseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseIndex")
            .field("embedder", &self.embedder.id())
            .field("dim", &self.embedder.dim())
            .field("batch_size", &self.batch_size)
            .field("entries", &self.len())
            .finish()
    }
}

impl Retriever for DenseIndex {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn search(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
        self.query(query, k, scope)
    }
}

fn embed_chunks<F>(embedder: &dyn Embedder, chunks: &[Chunk], batch_size: usize, mut on_progress: F) -> Result<Vec<Vec<f32>>>
where
    F: FnMut(usize),
{
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        vectors.extend(embed_texts(embedder, &texts)?);
        on_progress(vectors.len());
    }
    Ok(vectors)
}

/// One embedder call with the shape checks every caller needs: one vector
/// per text, each of the embedder's dimension, then L2 normalised.
fn embed_texts(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = embedder
        .embed_batch(texts)
        .map_err(|e| Error::EmbeddingUnavailable(format!("{}: {e:#}", embedder.id())))?;
    if vectors.len() != texts.len() {
        return Err(Error::EmbeddingUnavailable(format!(
            "{} returned {} vectors for {} texts",
            embedder.id(),
            vectors.len(),
            texts.len()
        )));
    }
    let dim = embedder.dim();
    for v in &mut vectors {
        if v.len() != dim {
            return Err(Error::EmbeddingUnavailable(format!(
                "{} returned a {}-dimensional vector, expected {dim}",
                embedder.id(),
                v.len()
            )));
        }
        l2_normalize(v);
    }
    Ok(vectors)
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
