use std::sync::{Arc, PoisonError, RwLock};

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use medrag_core::error::{Error, Result};
use medrag_core::traits::Retriever;
use medrag_core::types::{Chunk, Scope, SearchHit};

use crate::tantivy_utils::{build_schema, register_tokenizer, scope_filter, scope_key, Fields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One immutable generation of the keyword index together with the chunks it
/// was built from, addressed by position.
struct Built {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	chunks: Vec<Chunk>,
}

impl Built {
	fn new(chunks: &[Chunk]) -> Result<Self> {
		if chunks.is_empty() {
			return Err(Error::IndexBuild("keyword index needs at least one chunk".into()));
		}
		let (schema, fields) = build_schema();
		let index = Index::create_in_ram(schema);
		register_tokenizer(&index);

		// One thread and one commit keep every document in a single segment
		// whose doc order is corpus order.
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(build_err)?;
		for (position, chunk) in chunks.iter().enumerate() {
			writer
				.add_document(doc!(
					fields.position => position as u64,
					fields.text => chunk.text.as_str(),
					fields.scope => scope_key(chunk),
				))
				.map_err(build_err)?;
		}
		writer.commit().map_err(build_err)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(build_err)?;
		Ok(Self { index, reader, fields, chunks: chunks.to_vec() })
	}

	fn query(&self, text: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
		if k == 0 {
			return Ok(Vec::new());
		}
		let terms = self.query_terms(text)?;
		if terms.is_empty() {
			tracing::debug!("keyword query has no indexable terms");
			return Ok(Vec::new());
		}
		let terms_query: Box<dyn Query> = Box::new(BooleanQuery::new(
			terms
				.into_iter()
				.map(|term| (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>))
				.collect(),
		));
		let query: Box<dyn Query> = match scope_filter(self.fields.scope, scope) {
			Some(filter) => Box::new(BooleanQuery::new(vec![(Occur::Must, terms_query), (Occur::Must, filter)])),
			None => terms_query,
		};

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(query_err)?;
		let mut ranked = Vec::with_capacity(top_docs.len());
		for (score, address) in top_docs {
			let stored: TantivyDocument = searcher.doc(address).map_err(query_err)?;
			let position = stored
				.get_first(self.fields.position)
				.and_then(|v| v.as_u64())
				.ok_or_else(|| Error::Query("stored document lacks its position".into()))?;
			ranked.push((position as usize, score));
		}
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

		ranked
			.into_iter()
			.map(|(position, score)| {
				self.chunks
					.get(position)
					.map(|chunk| SearchHit { chunk: chunk.clone(), score })
					.ok_or_else(|| Error::Query(format!("position {position} outside the indexed chunks")))
			})
			.collect()
	}
}

impl Built {
	/// Distinct terms of `text` after the field's analyzer, in first-seen
	/// order. Query syntax has no meaning here; every word is a plain term.
	fn query_terms(&self, text: &str) -> Result<Vec<Term>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text).map_err(query_err)?;
		let mut stream = analyzer.token_stream(text);
		let mut words: Vec<String> = Vec::new();
		while stream.advance() {
			let word = &stream.token().text;
			if !words.contains(word) {
				words.push(word.clone());
			}
		}
		Ok(words.iter().map(|w| Term::from_field_text(self.fields.text, w)).collect())
	}
}

fn build_err(e: tantivy::TantivyError) -> Error {
	Error::IndexBuild(e.to_string())
}

fn query_err(e: tantivy::TantivyError) -> Error {
	Error::Query(e.to_string())
}

/// BM25 keyword index over the corpus.
///
/// Readers clone the current generation and release the lock before
/// searching; `rebuild` builds the next generation without holding any lock
/// and swaps it in under a short write lock.
pub struct SparseIndex {
	current: RwLock<Arc<Built>>,
}

impl SparseIndex {
	pub fn build(chunks: &[Chunk]) -> Result<Self> {
		let built = Built::new(chunks)?;
		tracing::info!(chunks = chunks.len(), "keyword index built");
		Ok(Self { current: RwLock::new(Arc::new(built)) })
	}

	/// Replace the index with one built from `chunks`. On failure the previous
	/// generation keeps serving.
	pub fn rebuild(&self, chunks: &[Chunk]) -> Result<()> {
		let built = Arc::new(Built::new(chunks)?);
		*self.current.write().unwrap_or_else(PoisonError::into_inner) = built;
		tracing::info!(chunks = chunks.len(), "keyword index rebuilt and swapped");
		Ok(())
	}

	/// Up to `k` chunks by BM25 score, ties in corpus order.
	pub fn query(&self, text: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
		let built = self.snapshot();
		let hits = built.query(text, k, scope)?;
		tracing::debug!(k, hits = hits.len(), "keyword query");
		Ok(hits)
	}

	pub fn len(&self) -> usize {
		self.snapshot().chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn snapshot(&self) -> Arc<Built> {
		Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
	}
}

impl Retriever for SparseIndex {
	fn name(&self) -> &'static str {
		"sparse"
	}

	fn search(&self, query: &str, k: usize, scope: &Scope) -> Result<Vec<SearchHit>> {
		self.query(query, k, scope)
	}
}
