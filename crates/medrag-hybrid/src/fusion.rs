use std::collections::BTreeMap;
use std::fmt;

use medrag_core::error::{Error, Result};
use medrag_core::traits::Retriever;
use medrag_core::types::{Chunk, ChunkId, RetrievalResult, RetrieverOrigin, Scope, SearchHit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub dense: f32,
    pub sparse: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { dense: 0.6, sparse: 0.4 }
    }
}

impl FusionWeights {
    pub fn new(dense: f32, sparse: f32) -> Result<Self> {
        let ok = |w: f32| w.is_finite() && w >= 0.0;
        if !ok(dense) || !ok(sparse) || (dense == 0.0 && sparse == 0.0) {
            return Err(Error::InvalidConfig(format!("invalid fusion weights dense={dense} sparse={sparse}")));
        }
        Ok(Self { dense, sparse })
    }
}

/// Recoverable problems met while answering a request. Carried next to the
/// results instead of failing the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    DenseUnavailable(String),
    SparseUnavailable(String),
    RetrievalExhausted,
    MinimalContext(String),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::DenseUnavailable(why) => write!(f, "dense retrieval unavailable: {why}"),
            Degradation::SparseUnavailable(why) => write!(f, "sparse retrieval unavailable: {why}"),
            Degradation::RetrievalExhausted => f.write_str("no retriever produced results"),
            Degradation::MinimalContext(why) => write!(f, "context reduced to patient information: {why}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    pub results: Vec<RetrievalResult>,
    pub warnings: Vec<Degradation>,
}

/// Divide by the list maximum; negatives clamp to 0 and an all-zero list
/// stays 0. Repeated chunks keep their first (best) score.
fn normalized(hits: &[SearchHit]) -> BTreeMap<ChunkId, (&Chunk, f32)> {
    let max = hits.iter().map(|h| h.score.max(0.0)).fold(0.0f32, f32::max);
    let mut out = BTreeMap::new();
    for hit in hits {
        let score = if max > 0.0 { hit.score.max(0.0) / max } else { 0.0 };
        out.entry(hit.chunk.id()).or_insert((&hit.chunk, score));
    }
    out
}

/// Weighted score fusion of two ranked lists, de-duplicated by chunk
/// identity, best first with ties in corpus order.
pub fn fuse(dense: &[SearchHit], sparse: &[SearchHit], weights: FusionWeights) -> Vec<RetrievalResult> {
    let dense = normalized(dense);
    let mut sparse = normalized(sparse);

    let mut fused: Vec<(ChunkId, RetrievalResult)> = Vec::with_capacity(dense.len() + sparse.len());
    for (id, (chunk, d)) in dense {
        let (score, origin) = match sparse.remove(&id) {
            Some((_, s)) => (weights.dense * d + weights.sparse * s, RetrieverOrigin::Both),
            None => (weights.dense * d, RetrieverOrigin::Dense),
        };
        fused.push((id, RetrievalResult { chunk: chunk.clone(), score, retriever_origin: origin }));
    }
    for (id, (chunk, s)) in sparse {
        fused.push((id, RetrievalResult { chunk: chunk.clone(), score: weights.sparse * s, retriever_origin: RetrieverOrigin::Sparse }));
    }
    fused.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    fused.into_iter().map(|(_, r)| r).collect()
}

/// Runs the dense and sparse retrievers independently and fuses their
/// answers. A missing or failing side degrades to the other one, whose
/// normalised scores are then used unweighted.
pub struct FusionRetriever<'a> {
    dense: Option<&'a dyn Retriever>,
    sparse: Option<&'a dyn Retriever>,
    weights: FusionWeights,
}

impl<'a> FusionRetriever<'a> {
    pub fn new(dense: Option<&'a dyn Retriever>, sparse: Option<&'a dyn Retriever>, weights: FusionWeights) -> Self {
        Self { dense, sparse, weights }
    }

    pub fn query(&self, text: &str, k: usize, scope: &Scope) -> FusionOutcome {
        let dense = run(self.dense, text, k, scope);
        let sparse = run(self.sparse, text, k, scope);
        let mut warnings = Vec::new();

        let results = match (dense, sparse) {
            (Ok(d), Ok(s)) => fuse(&d, &s, self.weights),
            (Err(why), Ok(s)) => {
                tracing::warn!(reason = %why, "dense retrieval unavailable, using sparse only");
                warnings.push(Degradation::DenseUnavailable(why));
                fuse(&[], &s, FusionWeights { dense: 0.0, sparse: 1.0 })
            }
            (Ok(d), Err(why)) => {
                tracing::warn!(reason = %why, "sparse retrieval unavailable, using dense only");
                warnings.push(Degradation::SparseUnavailable(why));
                fuse(&d, &[], FusionWeights { dense: 1.0, sparse: 0.0 })
            }
            (Err(dense_why), Err(sparse_why)) => {
                tracing::warn!(dense = %dense_why, sparse = %sparse_why, "both retrievers unavailable");
                warnings.push(Degradation::DenseUnavailable(dense_why));
                warnings.push(Degradation::SparseUnavailable(sparse_why));
                Vec::new()
            }
        };
        if results.is_empty() {
            warnings.push(Degradation::RetrievalExhausted);
        }
        tracing::debug!(k, fused = results.len(), warnings = warnings.len(), "fusion query");
        FusionOutcome { results, warnings }
    }
}

fn run(retriever: Option<&dyn Retriever>, text: &str, k: usize, scope: &Scope) -> std::result::Result<Vec<SearchHit>, String> {
    match retriever {
        None => Err("not configured".to_string()),
        Some(r) => r.search(text, k, scope).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrag_core::types::{ChunkSource, Meta};
    use proptest::prelude::*;

    fn chunk(seq: usize) -> Chunk {
        Chunk {
            text: format!("chunk {seq}"),
            category: "c".into(),
            subcategory: "s".into(),
            source: ChunkSource::KnowledgeBase,
            sequence_index: seq,
            session: None,
            meta: Meta::new(),
        }
    }

    fn hit(seq: usize, score: f32) -> SearchHit {
        SearchHit { chunk: chunk(seq), score }
    }

    struct Fixed(Vec<SearchHit>);

    impl Retriever for Fixed {
        fn name(&self) -> &'static str { "fixed" }
        fn search(&self, _: &str, k: usize, _: &Scope) -> Result<Vec<SearchHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct Broken;

    impl Retriever for Broken {
        fn name(&self) -> &'static str { "broken" }
        fn search(&self, _: &str, _: usize, _: &Scope) -> Result<Vec<SearchHit>> {
            Err(Error::EmbeddingUnavailable("offline".into()))
        }
    }

    #[test]
    fn overlapping_chunk_sums_weighted_scores() {
        let out = fuse(&[hit(0, 0.8), hit(1, 0.4)], &[hit(1, 10.0), hit(2, 5.0)], FusionWeights::default());
        assert_eq!(out[0].chunk.sequence_index, 1);
        assert_eq!(out[0].retriever_origin, RetrieverOrigin::Both);
        assert!((out[0].score - (0.6 * 0.5 + 0.4 * 1.0)).abs() < 1e-6);
        assert_eq!(out[1].chunk.sequence_index, 0);
        assert!((out[1].score - 0.6).abs() < 1e-6);
        assert_eq!(out[2].retriever_origin, RetrieverOrigin::Sparse);
        assert!((out[2].score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn negative_and_zero_scores_normalise_to_zero() {
        let out = fuse(&[hit(3, -0.2), hit(1, 0.0)], &[], FusionWeights::default());
        assert!(out.iter().all(|r| r.score == 0.0));
        assert_eq!(out[0].chunk.sequence_index, 1, "ties fall back to corpus order");
    }

    #[test]
    fn duplicates_within_a_list_are_merged() {
        let out = fuse(&[hit(0, 1.0), hit(0, 0.5)], &[], FusionWeights::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn dense_unavailable_equals_sparse_top_k() {
        let sparse = Fixed(vec![hit(4, 3.0), hit(2, 2.0), hit(7, 2.0), hit(1, 0.5)]);
        let fusion = FusionRetriever::new(Some(&Broken), Some(&sparse), FusionWeights::default());
        let out = fusion.query("q", 3, &Scope::All);
        let order: Vec<usize> = out.results.iter().map(|r| r.chunk.sequence_index).collect();
        assert_eq!(order, vec![4, 2, 7]);
        assert!(out.results.iter().all(|r| r.retriever_origin == RetrieverOrigin::Sparse));
        assert!(matches!(out.warnings.as_slice(), [Degradation::DenseUnavailable(_)]));
    }

    #[test]
    fn missing_dense_is_reported_like_a_failure() {
        let sparse = Fixed(vec![hit(0, 1.0)]);
        let out = FusionRetriever::new(None, Some(&sparse), FusionWeights::default()).query("q", 5, &Scope::All);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.warnings, vec![Degradation::DenseUnavailable("not configured".into())]);
    }

    #[test]
    fn sparse_failure_falls_back_to_dense() {
        let dense = Fixed(vec![hit(0, 0.9), hit(1, 0.3)]);
        let out = FusionRetriever::new(Some(&dense), Some(&Broken), FusionWeights::default()).query("q", 5, &Scope::All);
        assert_eq!(out.results.len(), 2);
        assert!((out.results[0].score - 1.0).abs() < 1e-6);
        assert!(matches!(out.warnings.as_slice(), [Degradation::SparseUnavailable(_)]));
    }

    #[test]
    fn both_empty_is_exhausted() {
        let empty = Fixed(Vec::new());
        let out = FusionRetriever::new(Some(&empty), Some(&empty), FusionWeights::default()).query("q", 5, &Scope::All);
        assert!(out.results.is_empty());
        assert_eq!(out.warnings, vec![Degradation::RetrievalExhausted]);

        let out = FusionRetriever::new(Some(&Broken), Some(&Broken), FusionWeights::default()).query("q", 5, &Scope::All);
        assert_eq!(out.warnings.len(), 3);
        assert_eq!(out.warnings.last(), Some(&Degradation::RetrievalExhausted));
    }

    #[test]
    fn weights_are_validated() {
        assert!(FusionWeights::new(0.0, 0.0).is_err());
        assert!(FusionWeights::new(-0.1, 1.0).is_err());
        assert!(FusionWeights::new(f32::NAN, 1.0).is_err());
        assert!(FusionWeights::new(1.0, 0.0).is_ok());
    }

    proptest! {
        #[test]
        fn fused_order_is_monotonic_in_dense_score(scores in prop::collection::vec(0u8..100, 1..20)) {
            let hits: Vec<SearchHit> = scores.iter().enumerate().map(|(i, s)| hit(i, f32::from(*s))).collect();
            let out = fuse(&hits, &[], FusionWeights::default());
            for pair in out.windows(2) {
                let a = scores[pair[0].chunk.sequence_index];
                let b = scores[pair[1].chunk.sequence_index];
                prop_assert!(a >= b);
            }
        }

        #[test]
        fn raising_a_dense_score_never_lowers_the_rank(
            scores in prop::collection::vec(0.0f32..10.0, 2..12),
            sparse in prop::collection::vec(0.0f32..10.0, 2..12),
            bump in 0.0f32..5.0,
        ) {
            let target = 1usize;
            let dense_hits = |raise: f32| -> Vec<SearchHit> {
                let mut hs: Vec<SearchHit> = scores.iter().enumerate().map(|(i, s)| hit(i, *s)).collect();
                // A fixed maximum keeps the normaliser unchanged.
                hs.push(hit(100, 20.0));
                hs[target].score = (hs[target].score + raise).min(20.0);
                hs
            };
            let sparse_hits: Vec<SearchHit> = sparse.iter().enumerate().map(|(i, s)| hit(i, *s)).collect();
            let rank = |raise: f32| {
                fuse(&dense_hits(raise), &sparse_hits, FusionWeights::default())
                    .iter()
                    .position(|r| r.chunk.sequence_index == target)
                    .unwrap()
            };
            prop_assert!(rank(bump) <= rank(0.0));
        }
    }
}
