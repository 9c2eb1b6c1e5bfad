//! Retrieval-augmented context: embed the query, nearest-neighbour search over
//! the chunk store, dedup by source, assemble `[chunk_id]`-prefixed context
//! with citations.
//!
//! An empty result set is never an error; the orchestrator simply proceeds
//! without retrieved context.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::StoreError;
use crate::store::{ChunkStore, ScoredChunk};

/// Default number of chunks handed to the orchestrator.
pub const DEFAULT_TOP_K: usize = 6;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>) -> Self {
        Self { embedder, store }
    }

    /// Top-k chunks by cosine similarity with `similarity >= min_similarity`.
    ///
    /// Chunks sharing the same `source` prefix before `#` collapse to their
    /// best-scoring representative, so one long email does not crowd out the
    /// rest of the context window.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
        source_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let vectors = self.embedder.embed(&[query]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("no vector returned".into()))?;

        // Over-fetch so source dedup still fills top_k.
        let raw = self
            .store
            .search(&query_vec, top_k * 4, source_filter)
            .await?;

        let mut seen_sources: Vec<String> = Vec::new();
        let mut out: Vec<ScoredChunk> = Vec::new();
        for hit in raw {
            if hit.similarity < min_similarity {
                continue;
            }
            let source_key = hit
                .chunk
                .source
                .split('#')
                .next()
                .unwrap_or(&hit.chunk.source)
                .to_string();
            if seen_sources.contains(&source_key) {
                continue;
            }
            seen_sources.push(source_key);
            out.push(hit);
            if out.len() == top_k {
                break;
            }
        }

        debug!(query_len = query.len(), hits = out.len(), "retrieval complete");
        Ok(out)
    }

    /// Concatenates chunk texts, each fragment prefixed by `[chunk_id]`, and
    /// returns the citation list in order of first appearance.
    pub fn assemble_context(chunks: &[ScoredChunk]) -> (String, Vec<String>) {
        let mut context = String::new();
        let mut citations = Vec::new();
        for scored in chunks {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&format!("[{}] {}", scored.chunk.chunk_id, scored.chunk.text));
            if !citations.contains(&scored.chunk.chunk_id) {
                citations.push(scored.chunk.chunk_id.clone());
            }
        }
        (context, citations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::store::{InMemoryChunkStore, NewChunk};

    async fn seeded_retriever() -> Retriever {
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(InMemoryChunkStore::new(16));
        for (id, source, text) in [
            ("c1", "mail_123#0", "Entrevista con Jhon Hernandez el martes"),
            ("c2", "mail_123#1", "Entrevista con Jhon Hernandez, sala 2"),
            ("c3", "calendar_2025#0", "Reunión de revisión del proyecto"),
        ] {
            let v = embedder.embed(&[text]).await.unwrap().remove(0);
            store
                .insert(NewChunk {
                    chunk_id: id.into(),
                    source: source.into(),
                    text: text.into(),
                    embedding: v,
                })
                .await
                .unwrap();
        }
        Retriever::new(embedder, store)
    }

    #[tokio::test]
    async fn own_text_retrieves_top_1() {
        let r = seeded_retriever().await;
        let hits = r
            .retrieve("Reunión de revisión del proyecto", 3, 0.0, None)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "c3");
    }

    #[tokio::test]
    async fn chunks_from_same_source_collapse() {
        let r = seeded_retriever().await;
        let hits = r
            .retrieve("Entrevista con Jhon Hernandez", 3, 0.0, None)
            .await
            .unwrap();
        let from_mail = hits
            .iter()
            .filter(|h| h.chunk.source.starts_with("mail_123"))
            .count();
        assert_eq!(from_mail, 1, "same-source chunks must dedup");
    }

    #[tokio::test]
    async fn top_k_zero_is_empty_not_an_error() {
        let r = seeded_retriever().await;
        let hits = r.retrieve("cualquier cosa", 0, 0.0, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn min_similarity_one_keeps_only_exact_matches() {
        let r = seeded_retriever().await;
        // Slightly above float rounding of a perfect cosine match.
        let hits = r
            .retrieve("texto que no está en la tienda", 3, 0.999, None)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.similarity >= 0.999));
    }

    #[tokio::test]
    async fn assemble_context_prefixes_and_cites_in_order() {
        let r = seeded_retriever().await;
        let hits = r.retrieve("Entrevista", 3, 0.0, None).await.unwrap();
        let (context, citations) = Retriever::assemble_context(&hits);
        assert!(!citations.is_empty());
        assert!(context.contains(&format!("[{}]", citations[0])));
    }

    #[tokio::test]
    async fn no_hits_returns_empty_context() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let store = Arc::new(InMemoryChunkStore::new(8));
        let r = Retriever::new(embedder, store);
        let hits = r.retrieve("vacío", 5, 0.0, None).await.unwrap();
        assert!(hits.is_empty());
        let (context, citations) = Retriever::assemble_context(&hits);
        assert!(context.is_empty());
        assert!(citations.is_empty());
    }
}
