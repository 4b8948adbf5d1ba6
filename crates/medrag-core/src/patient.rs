//! Patient-record chunks as handed over by the PDF extraction collaborator.

use serde::{Deserialize, Serialize};

use crate::chunker::Chunker;
use crate::corpus::PATIENT_CATEGORY;
use crate::types::{Chunk, ChunkSource, Meta};

/// Separators used for raw page text.
pub const PATIENT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientChunkInput {
    pub text: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
}

impl PatientChunkInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub(crate) fn into_chunk(self, sequence_index: usize, session: Option<&str>) -> Chunk {
        let mut meta = Meta::new();
        if let Some(file) = &self.source_file {
            meta.insert("source_file".to_string(), file.clone());
        }
        if let Some(page) = self.page_number {
            meta.insert("page_number".to_string(), page.to_string());
        }
        Chunk {
            text: self.text,
            category: PATIENT_CATEGORY.to_string(),
            subcategory: self.source_file.unwrap_or_else(|| "unknown".to_string()),
            source: ChunkSource::PatientRecord,
            sequence_index,
            session: session.map(str::to_string),
            meta,
        }
    }
}

/// Split extracted page text into tagged inputs. `pages` holds
/// `(page_number, text)` pairs as produced by the extraction step.
pub fn patient_chunks(pages: &[(u32, String)], source_file: &str, chunker: &Chunker) -> Vec<PatientChunkInput> {
    let mut out = Vec::new();
    for (page, text) in pages {
        for piece in chunker.split(text) {
            out.push(PatientChunkInput {
                text: piece,
                source_file: Some(source_file.to_string()),
                page_number: Some(*page),
            });
        }
    }
    tracing::debug!(source_file, pages = pages.len(), chunks = out.len(), "chunked patient document");
    out
}
