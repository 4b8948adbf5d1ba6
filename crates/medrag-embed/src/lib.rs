use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use medrag_core::config::{resolve_with_base, EmbeddingBackend, EmbeddingSettings};
use medrag_core::traits::Embedder;

pub mod device;
pub mod hashing;
pub mod pool;
pub mod timeout;
pub mod tokenize;

pub use device::select_device;
pub use hashing::HashingEmbedder;
pub use pool::masked_mean_l2;
pub use timeout::TimeoutEmbedder;
pub use tokenize::tokenize_batch;

/// BERT-family sentence encoder (e.g. all-MiniLM-L6-v2) with masked mean
/// pooling and L2 normalisation.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
}

impl SentenceEmbedder {
    /// Load `tokenizer.json`, `config.json` and either `model.safetensors` or
    /// `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        let shape: serde_json::Value = serde_json::from_str(&raw_config)?;
        let dim = shape["hidden_size"].as_u64().ok_or_else(|| anyhow!("config.json lacks hidden_size"))? as usize;
        let max_positions = shape["max_position_embeddings"].as_u64().map_or(max_len, |n| n as usize);

        let safetensors = model_dir.join("model.safetensors");
        let weights: HashMap<String, Tensor> = if safetensors.exists() {
            candle_core::safetensors::load(&safetensors, &device)?
        } else {
            candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?.into_iter().collect()
        };
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "bert".to_string());
        let max_len = max_len.min(max_positions);
        tracing::info!(model = %name, dim, max_len, "sentence embedder loaded");
        Ok(Self { model, tokenizer, device, id: format!("sentence:{name}"), dim, max_len })
    }
}

impl Embedder for SentenceEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden = self.model.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &inputs.attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }
}

/// Build the configured embedder, wrapped in a timeout when
/// `embedding.timeout_ms` is non-zero. Relative model paths resolve against
/// `base`; `APP_MODEL_DIR` overrides the configured directory.
pub fn embedder_from_settings(settings: &EmbeddingSettings, base: &Path) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match settings.backend {
        EmbeddingBackend::Hashing => {
            tracing::info!(dim = settings.hashing_dim, "using hashing embedder");
            Arc::new(HashingEmbedder::new(settings.hashing_dim))
        }
        EmbeddingBackend::Model => {
            let dir = resolve_model_dir(settings, base)?;
            Arc::new(SentenceEmbedder::load(&dir, settings.max_len)?)
        }
    };
    if settings.timeout_ms == 0 {
        return Ok(inner);
    }
    Ok(Arc::new(TimeoutEmbedder::new(inner, Duration::from_millis(settings.timeout_ms))?))
}

pub fn resolve_model_dir(settings: &EmbeddingSettings, base: &Path) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() { tracing::info!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); }
    }
    let configured = resolve_with_base(base, &settings.model_dir);
    if configured.exists() { return Ok(configured); }
    Err(anyhow!("Could not locate sentence model directory {}", configured.display()))
}
