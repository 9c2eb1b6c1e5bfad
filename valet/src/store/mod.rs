//! Persistence: semantic chunk store (vector search), conversation messages,
//! extracted/calendar events and the audit log.
//!
//! SQLite-backed stores open a connection per operation inside
//! `spawn_blocking`; writes that must be atomic (event insert + audit record)
//! share one transaction. The chunk store has a pure in-memory variant for
//! tests and mock mode and a sqlite-vec variant for persistent KNN search.

mod audit;
mod events;
mod memory_chunks;
mod messages;
mod sqlite_chunks;

pub use audit::{AuditLog, AuditRecord, SqliteAuditLog};
pub use events::{
    CalendarEvent, CalendarEventStatus, EventStatus, EventStore, ExtractedEvent, NewExtractedEvent,
};
pub use memory_chunks::InMemoryChunkStore;
pub use messages::{ConversationMessage, MessageStore, NewConversationMessage};
pub use sqlite_chunks::SqliteVecChunkStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// One retrievable unit of semantic memory (without its vector).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SemanticChunk {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape: chunk plus its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Search hit: chunk plus cosine similarity to the query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: SemanticChunk,
    pub similarity: f32,
}

/// Cosine similarity; zero-magnitude vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Vector store over semantic chunks. The embedding dimension is fixed at
/// store creation; inserts and queries with a different dimension are
/// rejected. Chunks are never mutated in place (supersede-by-insert).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert(&self, chunk: NewChunk) -> Result<(), StoreError>;

    /// Nearest neighbours by cosine similarity, best first. `source_filter`
    /// restricts hits to chunks whose source starts with the given prefix.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    fn dimension(&self) -> usize;
}
