//! Embedding producers: trait, OpenAI-backed implementation, deterministic
//! mock, and the bounded cache wrapper.

mod cache;
mod openai;

pub use cache::{CacheStats, CachedEmbedder, EmbeddingCache};
pub use openai::OpenAIEmbedder;

use async_trait::async_trait;

use crate::error::StoreError;

/// Produces fixed-size float vectors from text. Used by the chunk store on
/// insert and by retrieval on query.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each text into a vector of dimension [`Embedder::dimension`],
    /// one vector per input in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError>;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;
}

/// Deterministic embedder for tests and mock mode: folds bytes into a fixed
/// dimension so equal texts embed equally and similar texts land nearby.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; self.dimension];
                for (i, b) in t.bytes().enumerate() {
                    v[i % self.dimension] += b as f32 / 256.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let e = MockEmbedder::new(8);
        let a = e.embed(&["reunión con Juan"]).await.unwrap();
        let b = e.embed(&["reunión con Juan"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 8);
    }
}
