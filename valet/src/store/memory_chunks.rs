//! In-memory chunk store: dashmap of entries with a linear cosine scan.
//! Not persistent; used by tests and mock mode.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::store::{cosine_similarity, ChunkStore, NewChunk, ScoredChunk, SemanticChunk};

struct Entry {
    chunk: SemanticChunk,
    embedding: Vec<f32>,
}

pub struct InMemoryChunkStore {
    data: DashMap<String, Entry>,
    dimension: usize,
}

impl InMemoryChunkStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            data: DashMap::new(),
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn insert(&self, chunk: NewChunk) -> Result<(), StoreError> {
        if chunk.embedding.len() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: chunk.embedding.len(),
            });
        }
        let entry = Entry {
            chunk: SemanticChunk {
                chunk_id: chunk.chunk_id.clone(),
                source: chunk.source,
                text: chunk.text,
                created_at: Utc::now(),
            },
            embedding: chunk.embedding,
        };
        self.data.insert(chunk.chunk_id, entry);
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if embedding.len() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: embedding.len(),
            });
        }
        if limit == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<ScoredChunk> = self
            .data
            .iter()
            .filter(|e| {
                source_filter
                    .map(|p| e.chunk.source.starts_with(p))
                    .unwrap_or(true)
            })
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                similarity: cosine_similarity(embedding, &e.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, source: &str, text: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk_id: id.into(),
            source: source.into(),
            text: text.into(),
            embedding,
        }
    }

    #[tokio::test]
    async fn insert_and_search_orders_by_similarity() {
        let store = InMemoryChunkStore::new(2);
        store
            .insert(chunk("a", "mail#1", "hola", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(chunk("b", "mail#2", "adios", vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "a");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = InMemoryChunkStore::new(3);
        let err = store
            .insert(chunk("a", "s", "t", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Dimension { expected: 3, got: 1 }));

        let err = store.search(&[1.0], 5, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Dimension { .. }));
    }

    #[tokio::test]
    async fn source_filter_limits_hits() {
        let store = InMemoryChunkStore::new(2);
        store
            .insert(chunk("a", "calendar_2025#1", "evento", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(chunk("b", "mail#1", "correo", vec![1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0], 10, Some("calendar_"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, "a");
    }

    #[tokio::test]
    async fn zero_limit_returns_empty() {
        let store = InMemoryChunkStore::new(2);
        store
            .insert(chunk("a", "s", "t", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(store.search(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
    }
}
