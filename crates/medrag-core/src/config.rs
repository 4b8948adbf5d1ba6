//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__DENSE_WEIGHT=0.7`).
//! Defaults come from `Settings::default()`, so an empty directory yields a working config.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::material::{FallbackTable, MaterialType};
use crate::signals::KeywordTable;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(Path::new("."), &env_name)
    }

    pub fn load_for_env(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment, env_name: env_name.to_string() })
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub data: DataSettings,
    pub keywords: KeywordTable,
    pub fallback: FallbackTable,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.knowledge.validate("chunking.knowledge")?;
        self.chunking.patient.validate("chunking.patient")?;
        self.retrieval.validate()?;
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.backend == EmbeddingBackend::Hashing && self.embedding.hashing_dim == 0 {
            return Err(Error::InvalidConfig("embedding.hashing_dim must be > 0".into()));
        }
        for material in MaterialType::ALL {
            if self.fallback.categories_for(material).is_empty() {
                tracing::warn!(material = %material, "no static fallback categories configured");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkSize {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkSize {
    fn validate(&self, key: &str) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "{key}: chunk_overlap ({}) must be smaller than a non-zero chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub knowledge: ChunkSize,
    pub patient: ChunkSize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            knowledge: ChunkSize { chunk_size: 300, chunk_overlap: 30 },
            patient: ChunkSize { chunk_size: 500, chunk_overlap: 50 },
        }
    }
}

/// Whether patient chunks from one session are visible to another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    Shared,
    #[default]
    PerSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Final result budget after diversification.
    pub top_k: usize,
    /// Hits requested from each retriever before fusion.
    pub retriever_k: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub isolation: Isolation,
    /// Appended to every query together with the material type.
    pub query_suffix: String,
    pub default_material: MaterialType,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            retriever_k: 5,
            dense_weight: 0.6,
            sparse_weight: 0.4,
            isolation: Isolation::PerSession,
            query_suffix: "patient education medical guidance".to_string(),
            default_material: MaterialType::PostOperative,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 || self.retriever_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k and retrieval.retriever_k must be > 0".into()));
        }
        let weights = [self.dense_weight, self.sparse_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().all(|w| *w == 0.0) {
            return Err(Error::InvalidConfig(format!(
                "retrieval weights must be finite, non-negative and not both zero (dense={}, sparse={})",
                self.dense_weight, self.sparse_weight
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local sentence-transformer weights loaded with candle.
    #[default]
    Model,
    /// Deterministic token-hashing embedder; no model files needed.
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: String,
    pub max_len: usize,
    pub batch_size: usize,
    /// Upper bound for one embedding call; `0` disables the timeout.
    pub timeout_ms: u64,
    pub hashing_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Model,
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            max_len: 256,
            batch_size: 32,
            timeout_ms: 10_000,
            hashing_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub snapshot_path: String,
    /// Optional `<category>/<subcategory>.txt` tree replacing the built-in knowledge.
    pub knowledge_dir: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { snapshot_path: "data/dense_snapshot.json".to_string(), knowledge_dir: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().expect("defaults validate");
        assert!((settings.retrieval.dense_weight - 0.6).abs() < f32::EPSILON);
        assert!((settings.retrieval.sparse_weight - 0.4).abs() < f32::EPSILON);
        assert_eq!(settings.retrieval.retriever_k, 5);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let mut settings = Settings::default();
        settings.chunking.patient = ChunkSize { chunk_size: 50, chunk_overlap: 50 };
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_weights() {
        let mut settings = Settings::default();
        settings.retrieval.dense_weight = 0.0;
        settings.retrieval.sparse_weight = 0.0;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/medrag");
        assert_eq!(resolve_with_base(base, "/tmp/x.json"), PathBuf::from("/tmp/x.json"));
        assert_eq!(resolve_with_base(base, "data/x.json"), PathBuf::from("/srv/medrag/data/x.json"));
    }
}
