//! Ordered, append-only chunk collection shared by both retrievers.

use crate::chunker::Chunker;
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::patient::PatientChunkInput;
use crate::types::{Chunk, ChunkSource, Meta};

pub const PATIENT_CATEGORY: &str = "patient_record";

#[derive(Debug, Clone)]
pub struct Corpus {
    version: String,
    chunks: Vec<Chunk>,
    knowledge_len: usize,
}

impl Corpus {
    /// Chunk the knowledge base into a fresh corpus. The knowledge-base part
    /// is fixed from here on.
    pub fn from_knowledge(kb: &KnowledgeBase, chunker: &Chunker) -> Self {
        let chunks: Vec<Chunk> = kb
            .passages(chunker)
            .into_iter()
            .enumerate()
            .map(|(i, p)| Chunk {
                text: p.text,
                category: p.category,
                subcategory: p.subcategory,
                source: ChunkSource::KnowledgeBase,
                sequence_index: i,
                session: None,
                meta: Meta::new(),
            })
            .collect();
        let knowledge_len = chunks.len();
        tracing::info!(version = %kb.version, chunks = knowledge_len, "knowledge corpus built");
        Self { version: kb.version.clone(), chunks, knowledge_len }
    }

    /// Rebuild a corpus from previously issued chunks (e.g. a snapshot).
    /// Chunks must be knowledge first, each source numbered 0.. in order.
    pub fn from_chunks(version: &str, chunks: Vec<Chunk>) -> Result<Self> {
        let mut expected = [0usize; 2];
        let mut in_patient = false;
        for chunk in &chunks {
            let slot = match chunk.source {
                ChunkSource::KnowledgeBase if in_patient => {
                    return Err(Error::IndexBuild("knowledge chunk after patient chunks".into()));
                }
                ChunkSource::KnowledgeBase => 0,
                ChunkSource::PatientRecord => {
                    in_patient = true;
                    1
                }
            };
            if chunk.sequence_index != expected[slot] {
                return Err(Error::IndexBuild(format!(
                    "unexpected chunk identity {:?}/{}",
                    chunk.source, chunk.sequence_index
                )));
            }
            expected[slot] += 1;
        }
        Ok(Self { version: version.to_string(), knowledge_len: expected[0], chunks })
    }

    /// Append patient chunks for `session`, assigning the next sequence
    /// indexes. Returns the new chunks in order.
    pub fn append_patient(&mut self, session: Option<&str>, inputs: Vec<PatientChunkInput>) -> Vec<Chunk> {
        let start = self.chunks.len() - self.knowledge_len;
        let added: Vec<Chunk> = inputs
            .into_iter()
            .filter(|input| !input.text.trim().is_empty())
            .enumerate()
            .map(|(i, input)| input.into_chunk(start + i, session))
            .collect();
        self.chunks.extend(added.iter().cloned());
        added
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn knowledge(&self) -> &[Chunk] {
        &self.chunks[..self.knowledge_len]
    }

    pub fn patient(&self) -> &[Chunk] {
        &self.chunks[self.knowledge_len..]
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Hash of the version and knowledge-base chunks. Patient chunks do not
    /// contribute.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.version.as_bytes());
        for chunk in self.knowledge() {
            for field in [&chunk.category, &chunk.subcategory, &chunk.text] {
                hasher.update(&[0]);
                hasher.update(field.as_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Knowledge chunks whose category is in `categories`, in corpus order.
    pub fn knowledge_in(&self, categories: &[String]) -> Vec<&Chunk> {
        self.knowledge().iter().filter(|c| categories.iter().any(|cat| *cat == c.category)).collect()
    }

    /// Case-insensitive substring lookup over the knowledge chunks.
    pub fn search_knowledge(&self, needle: &str) -> Vec<&Chunk> {
        let needle = needle.to_lowercase();
        let matches: Vec<&Chunk> = self.knowledge().iter().filter(|c| c.text.to_lowercase().contains(&needle)).collect();
        tracing::debug!(query = %needle, matches = matches.len(), "knowledge substring search");
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KNOWLEDGE_SEPARATORS;

    fn corpus() -> Corpus {
        let kb = KnowledgeBase::builtin().expect("kb");
        let chunker = Chunker::new(300, 30).expect("chunker").with_separators(KNOWLEDGE_SEPARATORS);
        Corpus::from_knowledge(&kb, &chunker)
    }

    #[test]
    fn patient_chunks_append_with_fresh_identities() {
        let mut c = corpus();
        let kb_len = c.knowledge().len();
        let first = c.append_patient(Some("s1"), vec![PatientChunkInput::new("alpha"), PatientChunkInput::new("  ")]);
        let second = c.append_patient(Some("s2"), vec![PatientChunkInput::new("beta")]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].sequence_index, 0);
        assert_eq!(second[0].sequence_index, 1);
        assert_eq!(second[0].session.as_deref(), Some("s2"));
        assert_eq!(c.knowledge().len(), kb_len);
        assert_eq!(c.patient().len(), 2);
        assert_eq!(c.patient()[1].category, PATIENT_CATEGORY);
    }

    #[test]
    fn fingerprint_ignores_patient_chunks() {
        let mut c = corpus();
        let before = c.fingerprint();
        c.append_patient(None, vec![PatientChunkInput::new("gamma")]);
        assert_eq!(before, c.fingerprint());
    }

    #[test]
    fn from_chunks_round_trips_and_rejects_gaps() {
        let mut c = corpus();
        c.append_patient(None, vec![PatientChunkInput::new("delta")]);
        let rebuilt = Corpus::from_chunks(c.version(), c.chunks().to_vec()).expect("valid");
        assert_eq!(rebuilt.knowledge().len(), c.knowledge().len());
        assert_eq!(rebuilt.fingerprint(), c.fingerprint());

        let mut broken = c.chunks().to_vec();
        broken.remove(1);
        assert!(matches!(Corpus::from_chunks(c.version(), broken), Err(Error::IndexBuild(_))));
    }

    #[test]
    fn category_lookup_and_substring_search() {
        let c = corpus();
        let meds = c.knowledge_in(&["medication_guidance".to_string()]);
        assert!(!meds.is_empty());
        assert!(meds.iter().all(|ch| ch.category == "medication_guidance"));
        assert!(!c.search_knowledge("ANTIBIOTICS").is_empty());
    }
}
