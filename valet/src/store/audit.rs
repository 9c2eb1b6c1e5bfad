//! Audit log: one row per tool execution or error, with action, actor and
//! JSON payload. Event writes append their audit record inside the same
//! transaction (see `events.rs`); everything else goes through [`AuditLog`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::StoreError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub at: DateTime<Utc>,
    pub action: String,
    /// `"agent"` or `"user"`.
    pub actor: String,
    pub payload: serde_json::Value,
}

pub(crate) fn ensure_audit_table(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            at TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
        [],
    )
    .map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(())
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(
        &self,
        action: &str,
        actor: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// SQLite-backed audit log sharing the assistant database file.
pub struct SqliteAuditLog {
    db_path: std::path::PathBuf,
}

impl SqliteAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        ensure_audit_table(&conn)?;
        Ok(Self { db_path })
    }

    /// Most recent records, newest first. For diagnostics and tests.
    pub async fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, at, action, actor, payload FROM audit_log ORDER BY id DESC LIMIT ?1",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    let at: String = row.get(1)?;
                    let payload: String = row.get(4)?;
                    Ok(AuditRecord {
                        id: row.get(0)?,
                        at: DateTime::parse_from_rfc3339(&at)
                            .map(|d| d.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                        action: row.get(2)?,
                        actor: row.get(3)?,
                        payload: serde_json::from_str(&payload)
                            .unwrap_or(serde_json::Value::Null),
                    })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn record(
        &self,
        action: &str,
        actor: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let action = action.to_string();
        let actor = actor.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO audit_log (at, action, actor, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Utc::now().to_rfc3339(),
                    action,
                    actor,
                    payload.to_string()
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteAuditLog::new(dir.path().join("a.db")).unwrap();
        log.record("tool_call", "agent", serde_json::json!({"tool": "send_email"}))
            .await
            .unwrap();
        log.record("policy_refusal", "agent", serde_json::json!({"reason": "hours"}))
            .await
            .unwrap();

        let tail = log.tail(10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].action, "policy_refusal");
        assert_eq!(tail[1].payload["tool"], "send_email");
    }
}
