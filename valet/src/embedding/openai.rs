//! OpenAI Embeddings implementation of [`Embedder`].
//!
//! Supports `text-embedding-3-small`, `text-embedding-3-large` and
//! `text-embedding-ada-002`. Requires `OPENAI_API_KEY` (or explicit config).

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};

use crate::embedding::Embedder;
use crate::error::StoreError;

const EMBED_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI Embeddings client. Default model `text-embedding-3-small` (1536).
pub struct OpenAIEmbedder {
    config: OpenAIConfig,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new(), model)
    }

    /// Custom config for a different API key, base URL, or compatible provider.
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = Self::model_dimensions(&model);
        Self {
            config,
            model,
            dimensions,
        }
    }

    fn model_dimensions(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
            _ => 1536,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        let inputs: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let input = if inputs.len() == 1 {
            EmbeddingInput::String(inputs.into_iter().next().unwrap_or_default())
        } else {
            EmbeddingInput::StringArray(inputs)
        };

        let request = CreateEmbeddingRequest {
            input,
            model: self.model.clone(),
            ..Default::default()
        };

        let client = Client::with_config(self.config.clone());
        let response = tokio::time::timeout(EMBED_TIMEOUT, client.embeddings().create(request))
            .await
            .map_err(|_| StoreError::Embedding("embedding call timed out".into()))?
            .map_err(|e| StoreError::Embedding(format!("embeddings API error: {e}")))?;

        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;

    #[test]
    fn model_dimensions_cover_known_models() {
        assert_eq!(OpenAIEmbedder::model_dimensions("text-embedding-3-small"), 1536);
        assert_eq!(OpenAIEmbedder::model_dimensions("text-embedding-3-large"), 3072);
        assert_eq!(OpenAIEmbedder::model_dimensions("text-embedding-ada-002"), 1536);
        assert_eq!(OpenAIEmbedder::model_dimensions("unknown"), 1536);
    }

    #[test]
    fn embedder_reports_dimension() {
        let e = OpenAIEmbedder::new("text-embedding-3-large");
        assert_eq!(e.dimension(), 3072);
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY"]
    async fn embed_live() {
        std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set for this test");
        let e = OpenAIEmbedder::new("text-embedding-3-small");
        let v = e.embed(&["hola"]).await.unwrap();
        assert_eq!(v[0].len(), 1536);
    }
}
