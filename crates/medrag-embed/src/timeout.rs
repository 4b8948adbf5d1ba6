use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use medrag_core::traits::Embedder;

/// Bounds every `embed_batch` call of the wrapped embedder. The call runs on
/// a blocking thread of a private runtime; past the deadline the caller gets
/// an error while the abandoned call finishes in the background.
///
/// Must not be called from inside another tokio runtime.
pub struct TimeoutEmbedder {
    inner: Arc<dyn Embedder>,
    timeout: Duration,
    runtime: Option<Runtime>,
}

impl TimeoutEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, timeout: Duration) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().thread_name("medrag-embed").build()?;
        Ok(Self { inner, timeout, runtime: Some(runtime) })
    }
}

impl Embedder for TimeoutEmbedder {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn max_len(&self) -> usize {
        self.inner.max_len()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let runtime = self.runtime.as_ref().ok_or_else(|| anyhow!("embedding runtime shut down"))?;
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        let timeout = self.timeout;
        runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || inner.embed_batch(&texts));
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(anyhow!("embedding task failed: {join}")),
                Err(_) => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "embedding call timed out");
                    Err(anyhow!("embedding timed out after {} ms", timeout.as_millis()))
                }
            }
        })
    }
}

impl Drop for TimeoutEmbedder {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
