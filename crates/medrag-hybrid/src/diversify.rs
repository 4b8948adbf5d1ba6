use medrag_core::corpus::Corpus;
use medrag_core::material::{FallbackTable, MaterialType};
use medrag_core::types::{RetrievalResult, RetrieverOrigin};

/// Cap per-category representation in a list of at most `k` results.
///
/// Input that already fits is returned unchanged. Otherwise results are
/// grouped by category in first-seen order (relevance order kept inside each
/// group) and up to `max(1, k / groups)` are taken from the head of each
/// group in turn until `k` is reached. The output can be shorter than `k`
/// when the groups are small.
pub fn diversify(results: Vec<RetrievalResult>, k: usize) -> Vec<RetrievalResult> {
    if results.len() <= k {
        return results;
    }
    let mut groups: Vec<(String, Vec<RetrievalResult>)> = Vec::new();
    for result in results {
        match groups.iter_mut().find(|(category, _)| *category == result.chunk.category) {
            Some((_, members)) => members.push(result),
            None => groups.push((result.chunk.category.clone(), vec![result])),
        }
    }
    let per_category = (k / groups.len()).max(1);
    let mut picked = Vec::with_capacity(k);
    for (_, members) in groups {
        picked.extend(members.into_iter().take(per_category));
        if picked.len() >= k {
            break;
        }
    }
    picked.truncate(k);
    picked
}

/// Knowledge chunks statically mapped to `material`, in corpus order, at
/// most `k`, scored 0.
pub fn static_fallback(corpus: &Corpus, table: &FallbackTable, material: MaterialType, k: usize) -> Vec<RetrievalResult> {
    corpus
        .knowledge_in(table.categories_for(material))
        .into_iter()
        .take(k)
        .map(|chunk| RetrievalResult { chunk: chunk.clone(), score: 0.0, retriever_origin: RetrieverOrigin::StaticFallback })
        .collect()
}
