//! SQLite-backed chunk store with vector search via sqlite-vec.
//!
//! Dual-table design: `chunks` holds metadata (chunk_id, source, text,
//! created_at), a `vec0` virtual table holds the embeddings. KNN queries run
//! against the virtual table with cosine distance; similarity = 1 - distance.

use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::StoreError;
use crate::store::{ChunkStore, NewChunk, ScoredChunk, SemanticChunk};

static SQLITE_VEC_INIT: Once = Once::new();

fn vector_to_json(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub struct SqliteVecChunkStore {
    db_path: std::path::PathBuf,
    dimension: usize,
}

impl SqliteVecChunkStore {
    /// Opens (creating if needed) the chunk tables. Registers the sqlite-vec
    /// extension once per process.
    pub fn new(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        SQLITE_VEC_INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        });

        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY,
                chunk_id TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        conn.execute(
            &format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_embeddings USING vec0(embedding float[{}] distance_metric=cosine)",
                dimension
            ),
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Self { db_path, dimension })
    }
}

#[async_trait]
impl ChunkStore for SqliteVecChunkStore {
    async fn insert(&self, chunk: NewChunk) -> Result<(), StoreError> {
        if chunk.embedding.len() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: chunk.embedding.len(),
            });
        }
        let db_path = self.db_path.clone();
        let vec_json = vector_to_json(&chunk.embedding);
        let created_at = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            tx.execute(
                "INSERT INTO chunks (chunk_id, source, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.chunk_id, chunk.source, chunk.text, created_at],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rowid = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chunk_embeddings (rowid, embedding) VALUES (?1, ?2)",
                params![rowid, vec_json],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;

            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
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

        let db_path = self.db_path.clone();
        let vec_json = vector_to_json(embedding);
        let filter = source_filter.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            // Over-fetch when a source filter applies; the filter runs on the
            // joined metadata after KNN.
            let knn = if filter.is_some() { limit * 4 } else { limit };
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.chunk_id, c.source, c.text, c.created_at, e.distance
                    FROM chunk_embeddings e
                    JOIN chunks c ON c.id = e.rowid
                    WHERE e.embedding MATCH ?1 AND e.k = ?2
                    ORDER BY e.distance
                    "#,
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params![vec_json, knn as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                let (chunk_id, source, text, created_at, distance) =
                    row.map_err(|e| StoreError::Storage(e.to_string()))?;
                if let Some(ref prefix) = filter {
                    if !source.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                out.push(ScoredChunk {
                    chunk: SemanticChunk {
                        chunk_id,
                        source,
                        text,
                        created_at,
                    },
                    similarity: 1.0 - distance as f32,
                });
                if out.len() == limit {
                    break;
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
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
    async fn own_text_is_top_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVecChunkStore::new(dir.path().join("chunks.db"), 4).unwrap();
        store
            .insert(chunk("a", "mail#1", "entrevista", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(chunk("b", "mail#2", "factura", vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "a");
        assert!(hits[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn dimension_mismatch_rejected_before_sql() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVecChunkStore::new(dir.path().join("chunks.db"), 4).unwrap();
        let err = store.search(&[1.0], 2, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Dimension { expected: 4, got: 1 }));
    }

    #[tokio::test]
    async fn duplicate_chunk_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVecChunkStore::new(dir.path().join("chunks.db"), 2).unwrap();
        store
            .insert(chunk("dup", "s", "t", vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = store.insert(chunk("dup", "s", "t", vec![1.0, 0.0])).await;
        assert!(err.is_err());
    }
}
