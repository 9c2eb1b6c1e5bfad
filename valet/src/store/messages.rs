//! Conversation message store: webhook-ingested chat messages, keyed on the
//! provider's `message_sid` so duplicate deliveries are idempotent no-ops.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::StoreError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationMessage {
    pub message_sid: String,
    pub conversation_id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub event_extracted: bool,
    pub linked_event_id: Option<i64>,
}

/// Insert shape for a webhook delivery.
#[derive(Debug, Clone)]
pub struct NewConversationMessage {
    pub message_sid: String,
    pub conversation_id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// SQLite-backed message store. One table, unique on `message_sid`.
pub struct MessageStore {
    db_path: std::path::PathBuf,
}

impl MessageStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_sid TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                body TEXT NOT NULL,
                received_at TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                event_extracted INTEGER NOT NULL DEFAULT 0,
                linked_event_id INTEGER
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON conversation_messages(conversation_id)",
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    /// Inserts idempotently. Returns `true` when the row is new, `false` for a
    /// duplicate `message_sid` (silent success).
    pub async fn insert_idempotent(
        &self,
        msg: NewConversationMessage,
    ) -> Result<bool, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let inserted = conn
                .execute(
                    r#"
                    INSERT OR IGNORE INTO conversation_messages
                        (message_sid, conversation_id, sender, recipient, body, received_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        msg.message_sid,
                        msg.conversation_id,
                        msg.from,
                        msg.to,
                        msg.body,
                        msg.received_at.to_rfc3339()
                    ],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(inserted > 0)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Last `n` messages of one conversation, oldest first.
    pub async fn recent(
        &self,
        conversation_id: &str,
        n: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let db_path = self.db_path.clone();
        let conversation_id = conversation_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT message_sid, conversation_id, sender, recipient, body, received_at,
                           processed, event_extracted, linked_event_id
                    FROM (
                        SELECT * FROM conversation_messages
                        WHERE conversation_id = ?1
                        ORDER BY id DESC LIMIT ?2
                    ) ORDER BY id ASC
                    "#,
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![conversation_id, n as i64], row_to_message)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Marks a message analysed, optionally linking an extracted event.
    pub async fn mark_processed(
        &self,
        message_sid: &str,
        event_extracted: bool,
        linked_event_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let message_sid = message_sid.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                r#"
                UPDATE conversation_messages
                SET processed = 1, event_extracted = ?2, linked_event_id = ?3
                WHERE message_sid = ?1
                "#,
                params![message_sid, event_extracted as i64, linked_event_id],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Conversation ids that still have unprocessed messages; pass
    /// `all = true` to rescan everything.
    pub async fn conversations_to_process(&self, all: bool) -> Result<Vec<String>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let sql = if all {
                "SELECT DISTINCT conversation_id FROM conversation_messages"
            } else {
                "SELECT DISTINCT conversation_id FROM conversation_messages WHERE processed = 0"
            };
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    pub async fn get(&self, message_sid: &str) -> Result<Option<ConversationMessage>, StoreError> {
        let db_path = self.db_path.clone();
        let message_sid = message_sid.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT message_sid, conversation_id, sender, recipient, body, received_at,
                           processed, event_extracted, linked_event_id
                    FROM conversation_messages WHERE message_sid = ?1
                    "#,
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![message_sid], row_to_message)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            match rows.next() {
                Some(row) => Ok(Some(row.map_err(|e| StoreError::Storage(e.to_string()))?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessage> {
    let received_at: String = row.get(5)?;
    Ok(ConversationMessage {
        message_sid: row.get(0)?,
        conversation_id: row.get(1)?,
        from: row.get(2)?,
        to: row.get(3)?,
        body: row.get(4)?,
        received_at: DateTime::parse_from_rfc3339(&received_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        processed: row.get::<_, i64>(6)? != 0,
        event_extracted: row.get::<_, i64>(7)? != 0,
        linked_event_id: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sid: &str, conversation: &str, body: &str) -> NewConversationMessage {
        NewConversationMessage {
            message_sid: sid.into(),
            conversation_id: conversation.into(),
            from: "+34600000001".into(),
            to: "+34600000002".into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_sid_is_a_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("m.db")).unwrap();

        assert!(store.insert_idempotent(msg("SM1", "c1", "hola")).await.unwrap());
        assert!(!store.insert_idempotent(msg("SM1", "c1", "hola")).await.unwrap());

        let all = store.recent("c1", 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn recent_returns_last_n_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("m.db")).unwrap();
        for i in 0..5 {
            store
                .insert_idempotent(msg(&format!("SM{i}"), "c1", &format!("m{i}")))
                .await
                .unwrap();
        }
        let last3 = store.recent("c1", 3).await.unwrap();
        assert_eq!(
            last3.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            vec!["m2", "m3", "m4"]
        );
    }

    #[tokio::test]
    async fn mark_processed_links_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("m.db")).unwrap();
        store.insert_idempotent(msg("SM1", "c1", "viernes a las 10")).await.unwrap();

        store.mark_processed("SM1", true, Some(7)).await.unwrap();
        let got = store.get("SM1").await.unwrap().unwrap();
        assert!(got.processed);
        assert!(got.event_extracted);
        assert_eq!(got.linked_event_id, Some(7));
    }

    #[tokio::test]
    async fn unprocessed_conversations_listed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("m.db")).unwrap();
        store.insert_idempotent(msg("SM1", "c1", "a")).await.unwrap();
        store.insert_idempotent(msg("SM2", "c1", "b")).await.unwrap();
        store.insert_idempotent(msg("SM3", "c2", "c")).await.unwrap();
        store.mark_processed("SM3", false, None).await.unwrap();

        let pending = store.conversations_to_process(false).await.unwrap();
        assert_eq!(pending, vec!["c1".to_string()]);

        let all = store.conversations_to_process(true).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
