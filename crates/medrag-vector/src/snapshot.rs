//! Versioned JSON snapshot of the knowledge-base part of a dense index.
//!
//! ```text
//! { "schema_version": 1,
//!   "checksum": "<blake3 hex of the canonical payload JSON>",
//!   "payload": { "embedder_id", "dim", "corpus_version", "corpus_fingerprint",
//!                "created_at", "build": { "batch_size" }, "chunks", "vectors" } }
//! ```
//!
//! Patient chunks are never written. Any mismatch on load is an
//! `IndexLoad` error and the caller rebuilds from the corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, PoisonError};

use medrag_core::corpus::Corpus;
use medrag_core::error::{Error, Result};
use medrag_core::traits::Embedder;
use medrag_core::types::{Chunk, ChunkSource};

use crate::dense::DenseIndex;

pub const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub embedder_id: String,
    pub dim: usize,
    pub corpus_version: String,
    pub corpus_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub build: BuildInfo,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

fn checksum(payload: &Value) -> Result<String> {
    let canonical = serde_json::to_string(payload).map_err(|e| Error::IndexBuild(format!("encode payload: {e}")))?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

fn load_err(path: &Path, msg: impl std::fmt::Display) -> Error {
    Error::IndexLoad(format!("{}: {msg}", path.display()))
}

impl DenseIndex {
    /// Write the knowledge-base entries to `path` atomically (temp file in
    /// the same directory, then rename).
    pub fn save(&self, path: &Path, corpus_version: &str, corpus_fingerprint: &str) -> Result<()> {
        let payload = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = state
                .chunks
                .iter()
                .zip(&state.vectors)
                .filter(|(c, _)| c.source == ChunkSource::KnowledgeBase)
                .map(|(c, v)| (c.clone(), v.clone()))
                .unzip();
            Payload {
                embedder_id: self.embedder().id().to_string(),
                dim: self.embedder().dim(),
                corpus_version: corpus_version.to_string(),
                corpus_fingerprint: corpus_fingerprint.to_string(),
                created_at: Utc::now(),
                build: BuildInfo { batch_size: self.batch_size() },
                chunks,
                vectors,
            }
        };
        let entries = payload.chunks.len();
        let payload = serde_json::to_value(&payload).map_err(|e| Error::IndexBuild(format!("encode payload: {e}")))?;
        let envelope = serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "checksum": checksum(&payload)?,
            "payload": payload,
        });

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &envelope).map_err(std::io::Error::from)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::info!(path = %path.display(), entries, "dense snapshot written");
        Ok(())
    }

    /// Restore an index saved by `save`. The snapshot must have been written
    /// by the same embedder for a corpus with `expected_fingerprint`.
    pub fn load(path: &Path, embedder: Arc<dyn Embedder>, expected_fingerprint: &str) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| load_err(path, e))?;
        let envelope: Value = serde_json::from_slice(&bytes).map_err(|e| load_err(path, format!("corrupt snapshot: {e}")))?;

        let version = envelope.get("schema_version").and_then(Value::as_u64);
        if version != Some(SCHEMA_VERSION) {
            return Err(load_err(path, format!("schema version {version:?}, expected {SCHEMA_VERSION}")));
        }
        let payload = envelope.get("payload").ok_or_else(|| load_err(path, "missing payload"))?;
        let stored = envelope.get("checksum").and_then(Value::as_str).unwrap_or_default();
        if checksum(payload)? != stored {
            return Err(load_err(path, "checksum mismatch"));
        }
        let payload: Payload = Payload::deserialize(payload).map_err(|e| load_err(path, format!("payload: {e}")))?;

        if payload.embedder_id != embedder.id() {
            return Err(load_err(path, format!("written by embedder {}, current is {}", payload.embedder_id, embedder.id())));
        }
        if payload.dim != embedder.dim() || payload.vectors.iter().any(|v| v.len() != payload.dim) {
            return Err(load_err(path, format!("vector dimension does not match {}", embedder.dim())));
        }
        if payload.chunks.len() != payload.vectors.len() {
            return Err(load_err(path, format!("{} chunks but {} vectors", payload.chunks.len(), payload.vectors.len())));
        }
        if payload.chunks.iter().any(|c| c.source != ChunkSource::KnowledgeBase) {
            return Err(load_err(path, "snapshot holds patient chunks"));
        }
        if payload.corpus_fingerprint != expected_fingerprint {
            return Err(load_err(path, "corpus fingerprint differs from the current knowledge base"));
        }
        let recomputed = Corpus::from_chunks(&payload.corpus_version, payload.chunks.clone())
            .map_err(|e| load_err(path, e))?
            .fingerprint();
        if recomputed != payload.corpus_fingerprint {
            return Err(load_err(path, "stored chunks do not match the recorded fingerprint"));
        }

        tracing::info!(
            path = %path.display(),
            entries = payload.chunks.len(),
            created_at = %payload.created_at,
            "dense snapshot loaded"
        );
        Ok(DenseIndex::from_parts(embedder, payload.build.batch_size.max(1), payload.chunks, payload.vectors))
    }
}
