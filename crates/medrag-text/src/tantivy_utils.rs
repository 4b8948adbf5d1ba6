//! Schema, analyzer and scope terms for the keyword index.

use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::{Index, Term};

use medrag_core::types::{Chunk, ChunkSource, Scope};

pub const TOKENIZER: &str = "text_with_stopwords";

const KNOWLEDGE_SCOPE: &str = "kb";

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
	"that", "the", "to", "was", "will", "with", "or", "but", "this", "these", "they", "them", "their", "there",
	"then", "than", "so", "if", "when", "where", "how", "what", "which", "who", "whom", "whose", "can", "could",
	"would", "may", "might", "shall", "do", "does", "did", "have", "had", "having",
];

#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub position: Field,
	pub text: Field,
	pub scope: Field,
}

pub fn build_schema() -> (Schema, Fields) {
	let mut schema_builder = Schema::builder();
	let position = schema_builder.add_u64_field("position", STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text = schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(text_field_indexing));
	let scope = schema_builder.add_text_field("scope", STRING);
	(schema_builder.build(), Fields { position, text, scope })
}

/// Lowercasing analyzer that drops common English function words. "not",
/// "must" and "should" are not stop words here.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| (*s).to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Scope term stored with each chunk: `kb` for knowledge, `session:<id>` for
/// patient chunks (`session:` when the chunk has no owning session).
pub fn scope_key(chunk: &Chunk) -> String {
	match chunk.source {
		ChunkSource::KnowledgeBase => KNOWLEDGE_SCOPE.to_string(),
		ChunkSource::PatientRecord => format!("session:{}", chunk.session.as_deref().unwrap_or("")),
	}
}

/// Zero-scoring clause restricting matches to what `scope` may see, or
/// `None` when everything is visible.
pub fn scope_filter(field: Field, scope: &Scope) -> Option<Box<dyn Query>> {
	let term = |value: &str| -> Box<dyn Query> { Box::new(TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic)) };
	let allowed: Box<dyn Query> = match scope {
		Scope::All => return None,
		Scope::KnowledgeOnly => term(KNOWLEDGE_SCOPE),
		Scope::Session(id) => Box::new(BooleanQuery::new(vec![
			(Occur::Should, term(KNOWLEDGE_SCOPE)),
			(Occur::Should, term(&format!("session:{id}"))),
		])),
	};
	Some(Box::new(ConstScoreQuery::new(allowed, 0.0)))
}
