use std::env;

use medrag_core::knowledge::KNOWLEDGE_SEPARATORS;
use medrag_core::{Chunker, Corpus, KnowledgeBase, Scope};
use medrag_text::SparseIndex;

// Keyword search over the built-in knowledge base.
// Usage:
//   cargo run -p medrag-text --example search -- "your query" [--limit 5]

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut query = String::new();
    let mut limit: usize = 5;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
                limit = args[i + 1].parse().unwrap_or(limit);
                i += 2; continue;
            }
            s if s.starts_with("-") => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            s => {
                if query.is_empty() { query = s.to_string(); }
                i += 1; continue;
            }
        }
    }
    if query.is_empty() {
        eprintln!("Usage: cargo run -p medrag-text --example search -- <query> [--limit N]");
        std::process::exit(1);
    }

    let kb = KnowledgeBase::builtin()?;
    let chunker = Chunker::new(300, 30)?.with_separators(KNOWLEDGE_SEPARATORS);
    let corpus = Corpus::from_knowledge(&kb, &chunker);
    let index = SparseIndex::build(corpus.chunks())?;

    println!("Query: {:?}", query);
    for (rank, hit) in index.query(&query, limit, &Scope::All)?.iter().enumerate() {
        println!("{:>2}. [{:.3}] {}/{}: {}", rank + 1, hit.score, hit.chunk.category, hit.chunk.subcategory, hit.chunk.text);
    }
    Ok(())
}
