use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use medrag_core::config::{Isolation, Settings};
use medrag_core::corpus::Corpus;
use medrag_core::error::{Error, Result};
use medrag_core::material::MaterialType;
use medrag_core::patient::PatientChunkInput;
use medrag_core::signals::PatientSignals;
use medrag_core::traits::{Embedder, Retriever};
use medrag_core::types::{RetrievalResult, Scope};
use medrag_text::SparseIndex;
use medrag_vector::DenseIndex;

use crate::context::{assemble, minimal_context};
use crate::diversify::{diversify, static_fallback};
use crate::fusion::{Degradation, FusionRetriever, FusionWeights};

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    pub warnings: Vec<Degradation>,
}

/// Context string handed to the generation step, with everything that went
/// wrong on the way to it.
#[derive(Debug, Clone)]
pub struct GeneratedContext {
    pub text: String,
    pub warnings: Vec<Degradation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub corpus_version: String,
    pub knowledge_chunks: usize,
    pub patient_chunks: usize,
    pub dense_available: bool,
    pub dense_entries: usize,
    pub sparse_entries: usize,
    pub embedder_id: Option<String>,
}

/// Hybrid retrieval over one corpus: dense and sparse indexes kept in step
/// with the corpus, fused, diversified and formatted for generation.
///
/// Queries run concurrently. Patient insertions are serialised by a writer
/// gate; each index is observed either before or after an insertion, never
/// half way.
pub struct RetrievalEngine {
    corpus: RwLock<Corpus>,
    settings: Settings,
    weights: FusionWeights,
    dense: Option<DenseIndex>,
    dense_enabled: AtomicBool,
    sparse: SparseIndex,
    writer: Mutex<()>,
}

impl RetrievalEngine {
    /// Build both indexes from `corpus`. Without an embedder, or when the
    /// dense build fails, the engine serves sparse-only.
    pub fn new(corpus: Corpus, settings: Settings, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let dense = embedder.and_then(|embedder| {
            DenseIndex::build(corpus.chunks(), embedder, settings.embedding.batch_size)
                .map_err(|e| tracing::warn!(error = %e, "dense index unavailable, serving sparse only"))
                .ok()
        });
        Self::from_parts(corpus, settings, dense)
    }

    /// Like `new`, restoring the dense knowledge-base vectors from `snapshot`
    /// when it matches the corpus and embedder. Otherwise the dense index is
    /// rebuilt and the snapshot rewritten.
    pub fn with_snapshot(corpus: Corpus, settings: Settings, embedder: Option<Arc<dyn Embedder>>, snapshot: &Path) -> Result<Self> {
        let Some(embedder) = embedder else {
            return Self::new(corpus, settings, None);
        };
        let loaded = DenseIndex::load(snapshot, Arc::clone(&embedder), &corpus.fingerprint())
            .and_then(|index| index.add(corpus.patient()).map(|()| index));
        match loaded {
            Ok(index) => Self::from_parts(corpus, settings, Some(index)),
            Err(e) => {
                tracing::warn!(error = %e, path = %snapshot.display(), "dense snapshot not usable, rebuilding");
                let engine = Self::new(corpus, settings, Some(embedder))?;
                if let Err(e) = engine.save_snapshot(snapshot) {
                    tracing::warn!(error = %e, path = %snapshot.display(), "could not rewrite dense snapshot");
                }
                Ok(engine)
            }
        }
    }

    fn from_parts(corpus: Corpus, settings: Settings, dense: Option<DenseIndex>) -> Result<Self> {
        settings.validate()?;
        let weights = FusionWeights::new(settings.retrieval.dense_weight, settings.retrieval.sparse_weight)?;
        let sparse = SparseIndex::build(corpus.chunks())?;
        let dense_enabled = AtomicBool::new(dense.is_some());
        tracing::info!(
            version = corpus.version(),
            chunks = corpus.len(),
            dense = dense.is_some(),
            isolation = ?settings.retrieval.isolation,
            "retrieval engine ready"
        );
        Ok(Self { corpus: RwLock::new(corpus), settings, weights, dense, dense_enabled, sparse, writer: Mutex::new(()) })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Append a session's patient chunks to the corpus and both indexes.
    /// Returns how many chunks were added (blank inputs are skipped).
    ///
    /// A dense insertion failure leaves the chunks in the corpus and the
    /// keyword index and switches the engine to sparse-only.
    pub fn add_patient_chunks(&self, session: &str, inputs: Vec<PatientChunkInput>) -> Result<usize> {
        let _gate = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let (added, all) = {
            let mut corpus = self.corpus.write().unwrap_or_else(PoisonError::into_inner);
            let added = corpus.append_patient(Some(session), inputs);
            (added, corpus.chunks().to_vec())
        };
        if added.is_empty() {
            tracing::warn!(session, "no patient chunks to add");
            return Ok(0);
        }

        if let Some(dense) = self.active_dense() {
            if let Err(e) = dense.add(&added) {
                self.dense_enabled.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, session, "dense insertion failed, engine degraded to sparse only");
            }
        }
        self.sparse.rebuild(&all)?;
        tracing::info!(session, added = added.len(), total = all.len(), "patient chunks added");
        Ok(added.len())
    }

    fn active_dense(&self) -> Option<&DenseIndex> {
        self.dense.as_ref().filter(|_| self.dense_enabled.load(Ordering::SeqCst))
    }

    fn scope_for(&self, session: Option<&str>) -> Scope {
        match (self.settings.retrieval.isolation, session) {
            (Isolation::Shared, _) => Scope::All,
            (Isolation::PerSession, Some(id)) => Scope::Session(id.to_string()),
            (Isolation::PerSession, None) => Scope::KnowledgeOnly,
        }
    }

    /// Fused, diversified results for `query` enriched with the material
    /// type. When no retriever produces anything the static category table
    /// for `material` answers instead; only if that is empty too is the call
    /// an error.
    pub fn retrieve(&self, query: &str, material: MaterialType, session: Option<&str>, k: usize) -> Result<RetrievalOutcome> {
        let enhanced = format!("{query} {material} {}", self.settings.retrieval.query_suffix);
        let scope = self.scope_for(session);
        tracing::debug!(query = %enhanced.trim(), ?scope, k, "retrieve");

        let dense = self.active_dense().map(|d| d as &dyn Retriever);
        let fusion = FusionRetriever::new(dense, Some(&self.sparse as &dyn Retriever), self.weights);
        let fused = fusion.query(enhanced.trim(), self.settings.retrieval.retriever_k, &scope);

        if !fused.results.is_empty() {
            let results = diversify(fused.results, k);
            tracing::info!(material = %material, results = results.len(), "retrieval complete");
            return Ok(RetrievalOutcome { results, warnings: fused.warnings });
        }

        let results = {
            let corpus = self.corpus.read().unwrap_or_else(PoisonError::into_inner);
            static_fallback(&corpus, &self.settings.fallback, material, k)
        };
        if results.is_empty() {
            tracing::warn!(material = %material, "static fallback has no chunks for material");
            return Err(Error::RetrievalExhausted);
        }
        tracing::info!(material = %material, results = results.len(), "served static fallback");
        Ok(RetrievalOutcome { results, warnings: fused.warnings })
    }

    /// `retrieve` with the query derived from `signals` and the configured
    /// `top_k`.
    pub fn retrieve_for(&self, signals: &PatientSignals, material: MaterialType, session: Option<&str>) -> Result<RetrievalOutcome> {
        self.retrieve(&signals.query_text(material), material, session, self.settings.retrieval.top_k)
    }

    /// Always produces a context; retrieval errors reduce it to the patient
    /// block and education type.
    pub fn context_for_generation(&self, signals: &PatientSignals, material: MaterialType, session: Option<&str>) -> GeneratedContext {
        match self.retrieve_for(signals, material, session) {
            Ok(outcome) => {
                let text = assemble(signals, material, &outcome.results);
                tracing::info!(chunks = outcome.results.len(), warnings = outcome.warnings.len(), "generation context assembled");
                GeneratedContext { text, warnings: outcome.warnings }
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, emitting minimal context");
                GeneratedContext { text: minimal_context(signals, material), warnings: vec![Degradation::MinimalContext(e.to_string())] }
            }
        }
    }

    /// Persist the dense knowledge-base vectors.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let dense = self.dense.as_ref().ok_or_else(|| Error::EmbeddingUnavailable("no dense index to snapshot".into()))?;
        let corpus = self.corpus.read().unwrap_or_else(PoisonError::into_inner);
        dense.save(path, corpus.version(), &corpus.fingerprint())
    }

    pub fn stats(&self) -> EngineStats {
        let corpus = self.corpus.read().unwrap_or_else(PoisonError::into_inner);
        EngineStats {
            corpus_version: corpus.version().to_string(),
            knowledge_chunks: corpus.knowledge().len(),
            patient_chunks: corpus.patient().len(),
            dense_available: self.active_dense().is_some(),
            dense_entries: self.dense.as_ref().map_or(0, DenseIndex::len),
            sparse_entries: self.sparse.len(),
            embedder_id: self.dense.as_ref().map(|d| d.embedder().id().to_string()),
        }
    }
}
