//! Domain types shared by the dense and sparse retrievers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type SessionId = String;
pub type Meta = BTreeMap<String, String>;

/// Where a chunk came from. Knowledge-base chunks sort before patient chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
    KnowledgeBase,
    PatientRecord,
}

impl ChunkSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkSource::KnowledgeBase => "knowledge_base",
            ChunkSource::PatientRecord => "patient_record",
        }
    }
}

/// Identity of a chunk within a corpus. The derived ordering is corpus
/// insertion order, since the knowledge base is appended before any patient
/// record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId {
    pub source: ChunkSource,
    pub sequence_index: usize,
}

/// The atomic unit of retrieval.
///
/// - `category`/`subcategory`: curated topic labels; patient chunks use
///   `patient_record` and their source file
/// - `session`: owning session for patient chunks, `None` for knowledge
/// - `meta`: opaque collaborator attributes (`source_file`, `page_number`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub category: String,
    pub subcategory: String,
    pub source: ChunkSource,
    pub sequence_index: usize,
    #[serde(default)]
    pub session: Option<SessionId>,
    #[serde(default)]
    pub meta: Meta,
}

impl Chunk {
    pub fn id(&self) -> ChunkId {
        ChunkId { source: self.source, sequence_index: self.sequence_index }
    }

    pub fn is_visible_in(&self, scope: &Scope) -> bool {
        match self.source {
            ChunkSource::KnowledgeBase => true,
            ChunkSource::PatientRecord => match scope {
                Scope::All => true,
                Scope::KnowledgeOnly => false,
                Scope::Session(id) => self.session.as_deref() == Some(id.as_str()),
            },
        }
    }
}

/// Which patient chunks a query is allowed to see. Knowledge-base chunks
/// are visible in every scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    KnowledgeOnly,
    Session(SessionId),
}

/// A single retriever's answer: the chunk and its raw engine score.
/// Higher is always better.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Indicates which retriever produced a fused result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverOrigin {
    Dense,
    Sparse,
    Both,
    StaticFallback,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    pub retriever_origin: RetrieverOrigin,
}
