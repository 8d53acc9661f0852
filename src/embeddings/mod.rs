pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, Chunks, chunk};
pub use ollama::OllamaClient;

/// Turns text into a fixed-length vector.
///
/// Calls are synchronous; implementations own their own timeout and retry policy.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for &T {
    #[inline]
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        (**self).embed(text)
    }
}
