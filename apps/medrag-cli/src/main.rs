use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use medrag_core::config::{expand_path, resolve_with_base, Config, Settings};
use medrag_core::knowledge::KNOWLEDGE_SEPARATORS;
use medrag_core::patient::{patient_chunks, PATIENT_SEPARATORS};
use medrag_core::{Chunker, Corpus, KnowledgeBase, MaterialType};
use medrag_embed::embedder_from_settings;
use medrag_hybrid::RetrievalEngine;
use medrag_vector::DenseIndex;

const USAGE: &str = "Usage: medrag <index|query|context|stats> [options]
  index                                  embed the knowledge base and write the dense snapshot
  query \"<text>\" [--material M] [--k N] [--session S] [--patient FILE]...
  context [--material M] [--session S] [--patient FILE]...
  stats  [--patient FILE]...";

const CLI_SESSION: &str = "cli";

#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    material: Option<String>,
    k: Option<usize>,
    session: Option<String>,
    patient_files: Vec<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        if !flag.starts_with('-') {
            args.positional.push(arg.clone());
            continue;
        }
        let value = iter.next().cloned().with_context(|| format!("{flag} requires a value"))?;
        match flag {
            "--material" | "-m" => args.material = Some(value),
            "--k" | "-k" => args.k = Some(value.parse().with_context(|| format!("--k expects a number, got {value}"))?),
            "--session" | "-s" => args.session = Some(value),
            "--patient" | "-p" => args.patient_files.push(PathBuf::from(value)),
            _ => bail!("unknown option {flag}\n{USAGE}"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = raw.remove(0);
    let args = parse_args(&raw)?;

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    tracing::info!(env = config.env_name(), "configuration loaded");
    let base = env::current_dir()?;

    match cmd.as_str() {
        "index" => index(&settings, &base),
        "query" => query(settings, &base, &args),
        "context" => context(settings, &base, &args),
        "stats" => stats(settings, &base, &args),
        other => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    }
}

fn load_corpus(settings: &Settings) -> Result<Corpus> {
    let kb = match &settings.data.knowledge_dir {
        Some(dir) => {
            let root = expand_path(dir);
            KnowledgeBase::from_dir(&root, "local").with_context(|| format!("reading knowledge from {}", root.display()))?
        }
        None => KnowledgeBase::builtin()?,
    };
    let size = &settings.chunking.knowledge;
    let chunker = Chunker::new(size.chunk_size, size.chunk_overlap)?.with_separators(KNOWLEDGE_SEPARATORS);
    Ok(Corpus::from_knowledge(&kb, &chunker))
}

fn snapshot_path(settings: &Settings, base: &Path) -> PathBuf {
    resolve_with_base(base, &settings.data.snapshot_path)
}

fn index(settings: &Settings, base: &Path) -> Result<()> {
    let corpus = load_corpus(settings)?;
    let embedder = embedder_from_settings(&settings.embedding, base)?;
    println!("Dense Snapshot Indexer\n======================");
    println!("Knowledge chunks: {}", corpus.len());
    println!("Embedder: {}", embedder.id());

    let bar = ProgressBar::new(corpus.len() as u64);
    bar.set_style(ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} chunks")?);
    let index = DenseIndex::build_with_progress(corpus.chunks(), embedder, settings.embedding.batch_size, |done| {
        bar.set_position(done as u64);
    })?;
    bar.finish();

    let path = snapshot_path(settings, base);
    index.save(&path, corpus.version(), &corpus.fingerprint())?;
    println!("\n✅ Wrote {} vectors to {}", index.len(), path.display());
    Ok(())
}

/// Engine over the configured knowledge, with any `--patient` files added to
/// the session.
fn open_engine(settings: Settings, base: &Path, args: &Args) -> Result<(RetrievalEngine, Vec<String>)> {
    let corpus = load_corpus(&settings)?;
    let embedder = match embedder_from_settings(&settings.embedding, base) {
        Ok(e) => Some(e),
        Err(e) => {
            tracing::warn!(error = %e, "embedder unavailable, continuing with keyword retrieval");
            None
        }
    };
    let snapshot = snapshot_path(&settings, base);
    let size = settings.chunking.patient;
    let engine = RetrievalEngine::with_snapshot(corpus, settings, embedder, &snapshot)?;

    let chunker = Chunker::new(size.chunk_size, size.chunk_overlap)?.with_separators(PATIENT_SEPARATORS);
    let session = args.session.as_deref().unwrap_or(CLI_SESSION);
    let mut texts = Vec::new();
    for file in &args.patient_files {
        let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let name = file.file_name().map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        let inputs = patient_chunks(&[(1, text.clone())], &name, &chunker);
        let added = engine.add_patient_chunks(session, inputs)?;
        println!("📄 {name}: {added} patient chunks");
        texts.push(text);
    }
    Ok((engine, texts))
}

fn material(settings: &Settings, args: &Args) -> MaterialType {
    args.material
        .as_deref()
        .map_or(settings.retrieval.default_material, |m| MaterialType::parse_or_default(m, settings.retrieval.default_material))
}

fn query(settings: Settings, base: &Path, args: &Args) -> Result<()> {
    let Some(text) = args.positional.first() else {
        bail!("query needs a text argument\n{USAGE}");
    };
    let material = material(&settings, args);
    let k = args.k.unwrap_or(settings.retrieval.top_k);
    let session = args.session.as_deref().or((!args.patient_files.is_empty()).then_some(CLI_SESSION));
    let (engine, _) = open_engine(settings, base, args)?;

    let outcome = engine.retrieve(text, material, session, k)?;
    println!("🔍 {} results for \"{text}\" ({material})", outcome.results.len());
    for (i, r) in outcome.results.iter().enumerate() {
        println!(
            "\n{}. [{:.4}] {:?} {}/{}\n   {}",
            i + 1,
            r.score,
            r.retriever_origin,
            r.chunk.category,
            r.chunk.subcategory,
            r.chunk.text.replace('\n', " ")
        );
    }
    for w in &outcome.warnings {
        println!("⚠️  {w}");
    }
    Ok(())
}

fn context(settings: Settings, base: &Path, args: &Args) -> Result<()> {
    let material = material(&settings, args);
    let keywords = settings.keywords.clone();
    let session = args.session.as_deref().or((!args.patient_files.is_empty()).then_some(CLI_SESSION));
    let (engine, texts) = open_engine(settings, base, args)?;

    let signals = keywords.extract(texts.iter().map(String::as_str));
    let generated = engine.context_for_generation(&signals, material, session);
    println!("{}", generated.text);
    for w in &generated.warnings {
        eprintln!("⚠️  {w}");
    }
    Ok(())
}

fn stats(settings: Settings, base: &Path, args: &Args) -> Result<()> {
    let (engine, _) = open_engine(settings, base, args)?;
    let s = engine.stats();
    println!("Corpus version:   {}", s.corpus_version);
    println!("Knowledge chunks: {}", s.knowledge_chunks);
    println!("Patient chunks:   {}", s.patient_chunks);
    println!("Dense available:  {}", s.dense_available);
    println!("Dense entries:    {}", s.dense_entries);
    println!("Sparse entries:   {}", s.sparse_entries);
    println!("Embedder:         {}", s.embedder_id.as_deref().unwrap_or("none"));
    Ok(())
}
