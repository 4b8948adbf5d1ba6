use std::path::Path;

use medrag_core::config::{EmbeddingBackend, EmbeddingSettings};
use medrag_embed::embedder_from_settings;

#[test]
fn hashing_backend_shapes_and_determinism() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Hashing, hashing_dim: 128, ..EmbeddingSettings::default() };
    let embedder = embedder_from_settings(&settings, Path::new(".")).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 128, "embedding dim follows hashing_dim");
    assert_eq!(embedder.dim(), 128);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn missing_model_directory_is_an_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let settings = EmbeddingSettings { model_dir: "no-such-model".to_string(), ..EmbeddingSettings::default() };
    if std::env::var("APP_MODEL_DIR").is_ok() {
        return;
    }
    assert!(embedder_from_settings(&settings, tmp.path()).is_err());
}
