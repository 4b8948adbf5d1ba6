use medrag_core::knowledge::KNOWLEDGE_SEPARATORS;
use medrag_core::patient::PatientChunkInput;
use medrag_core::types::{Chunk, ChunkSource, Meta};
use medrag_core::{Chunker, Corpus, KnowledgeBase, Scope};
use medrag_text::SparseIndex;

fn corpus() -> Corpus {
    let kb = KnowledgeBase::builtin().expect("kb");
    let chunker = Chunker::new(300, 30).expect("chunker").with_separators(KNOWLEDGE_SEPARATORS);
    Corpus::from_knowledge(&kb, &chunker)
}

fn ranking(index: &SparseIndex, query: &str) -> Vec<(String, u32)> {
    index
        .query(query, 5, &Scope::All)
        .expect("query")
        .into_iter()
        .map(|h| (h.chunk.text, h.score.to_bits()))
        .collect()
}

#[test]
fn rebuild_with_unchanged_chunks_gives_identical_ranking() {
    let corpus = corpus();
    let index = SparseIndex::build(corpus.chunks()).expect("build");
    let queries = ["wound infection fever", "take medication with food", "protein diet after surgery"];
    let before: Vec<_> = queries.iter().map(|q| ranking(&index, q)).collect();
    assert!(before.iter().all(|r| !r.is_empty()));

    index.rebuild(corpus.chunks()).expect("rebuild");
    let after: Vec<_> = queries.iter().map(|q| ranking(&index, q)).collect();
    assert_eq!(before, after);

    let fresh = SparseIndex::build(corpus.chunks()).expect("fresh");
    let again: Vec<_> = queries.iter().map(|q| ranking(&fresh, q)).collect();
    assert_eq!(before, again);
}

#[test]
fn term_only_in_patient_chunk_is_retrieved() {
    let mut corpus = corpus();
    let index = SparseIndex::build(corpus.chunks()).expect("build");
    assert!(index.query("cholecystectomy", 5, &Scope::All).expect("query").is_empty());

    corpus.append_patient(Some("s1"), vec![PatientChunkInput::new("Laparoscopic cholecystectomy on 3 March, no complications.")]);
    index.rebuild(corpus.chunks()).expect("rebuild");

    let hits = index.query("cholecystectomy", 5, &Scope::Session("s1".into())).expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.category, "patient_record");
    assert!(index.query("cholecystectomy", 5, &Scope::Session("s2".into())).expect("query").is_empty());
}

fn small_index() -> SparseIndex {
    let texts = ["Keep the incision dry.", "Eat small meals.", "Swallow tablets whole.", "Call if fever rises."];
    let chunks: Vec<Chunk> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Chunk {
            text: t.to_string(),
            category: "care".to_string(),
            subcategory: "general".to_string(),
            source: ChunkSource::KnowledgeBase,
            sequence_index: i,
            session: None,
            meta: Meta::new(),
        })
        .collect();
    SparseIndex::build(&chunks).expect("build")
}

#[test]
fn labelled_record_phrasing_ranks_like_bare_terms() {
    let index = small_index();
    let bare = ranking(&index, "tablets");
    assert_eq!(bare.len(), 1);
    assert_eq!(ranking(&index, "Medication: tablets"), bare);
    assert_eq!(ranking(&index, "Medication: tablets whole"), ranking(&index, "tablets whole"));
    assert_eq!(ranking(&index, "Diagnosis: fever"), ranking(&index, "fever"));
}

#[test]
fn stop_word_queries_leave_retrieval_empty() {
    let index = small_index();
    assert!(ranking(&index, "the of and").is_empty());
    assert!(ranking(&index, "of the").is_empty());
}
