//! Extracted events and materialised calendar events.
//!
//! Status transitions are forward-only: `proposed|suggested -> confirmed ->
//! created`, or any pre-terminal status `-> rejected`. Materialising to
//! `created` writes the CalendarEvent row and the audit record in the same
//! transaction as the status update.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::audit::ensure_audit_table;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Proposed,
    Suggested,
    Confirmed,
    Created,
    Rejected,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Suggested => "suggested",
            Self::Confirmed => "confirmed",
            Self::Created => "created",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "suggested" => Some(Self::Suggested),
            "confirmed" => Some(Self::Confirmed),
            "created" => Some(Self::Created),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Forward-only transition rules. `proposed` and `suggested` behave
    /// identically as the pre-confirmation state.
    pub fn can_transition(self, to: EventStatus) -> bool {
        matches!(
            (self, to),
            (Self::Proposed | Self::Suggested, Self::Confirmed)
                | (Self::Proposed | Self::Suggested, Self::Rejected)
                | (Self::Confirmed, Self::Created)
                | (Self::Confirmed, Self::Rejected)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEvent {
    pub id: i64,
    /// Originating collaborator (`whatsapp`, `calendly`, `mail`, ...).
    pub source: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub timezone: String,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub status: EventStatus,
    pub confidence: f64,
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewExtractedEvent {
    pub source: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub timezone: String,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub status: EventStatus,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEventStatus {
    Confirmed,
    Cancelled,
    Tentative,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub provider: String,
    pub provider_event_id: String,
    pub calendar_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: CalendarEventStatus,
    pub last_sync_at: DateTime<Utc>,
    pub extracted_event_id: Option<i64>,
}

/// SQLite-backed store for extracted and calendar events.
pub struct EventStore {
    db_path: std::path::PathBuf,
}

impl EventStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS extracted_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT,
                timezone TEXT NOT NULL,
                location TEXT,
                attendees TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                confidence REAL NOT NULL,
                relevance_score REAL
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS calendar_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL,
                provider_event_id TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                title TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT,
                status TEXT NOT NULL,
                last_sync_at TEXT NOT NULL,
                extracted_event_id INTEGER,
                UNIQUE(provider, provider_event_id)
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        ensure_audit_table(&conn)?;
        Ok(Self { db_path })
    }

    /// Inserts a new extracted event with its audit record in one transaction.
    /// Rejects `end_at < start_at`.
    pub async fn insert(&self, event: NewExtractedEvent) -> Result<i64, StoreError> {
        if let Some(end) = event.end_at {
            if end < event.start_at {
                return Err(StoreError::Storage(
                    "end_at must not precede start_at".into(),
                ));
            }
        }
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                r#"
                INSERT INTO extracted_events
                    (source, title, start_at, end_at, timezone, location, attendees, status, confidence)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    event.source,
                    event.title,
                    event.start_at.to_rfc3339(),
                    event.end_at.map(|d| d.to_rfc3339()),
                    event.timezone,
                    event.location,
                    serde_json::to_string(&event.attendees).unwrap_or_else(|_| "[]".into()),
                    event.status.as_str(),
                    event.confidence,
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO audit_log (at, action, actor, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Utc::now().to_rfc3339(),
                    "event_insert",
                    "agent",
                    serde_json::json!({"event_id": id, "title": event.title}).to_string()
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(id)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    pub async fn get(&self, id: i64) -> Result<Option<ExtractedEvent>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(&format!("{SELECT_EVENT} WHERE id = ?1"))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![id], row_to_event)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            match rows.next() {
                Some(r) => Ok(Some(r.map_err(|e| StoreError::Storage(e.to_string()))?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Forthcoming non-rejected events from `now`, soonest first.
    pub async fn upcoming(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExtractedEvent>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_EVENT} WHERE start_at >= ?1 AND status != 'rejected' ORDER BY start_at ASC LIMIT ?2"
                ))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![now.to_rfc3339(), limit as i64], row_to_event)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Non-rejected events overlapping `[start, end)`. Events without `end_at`
    /// are treated as one hour long.
    pub async fn overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExtractedEvent>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_EVENT} WHERE status != 'rejected' AND start_at < ?1 ORDER BY start_at ASC"
                ))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![end.to_rfc3339()], row_to_event)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut out = Vec::new();
            for row in rows {
                let event = row.map_err(|e| StoreError::Storage(e.to_string()))?;
                let event_end = event
                    .end_at
                    .unwrap_or(event.start_at + chrono::Duration::hours(1));
                if event_end > start {
                    out.push(event);
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Applies a forward-only status transition (not `created`; see
    /// [`EventStore::materialise`]).
    pub async fn transition(
        &self,
        id: i64,
        to: EventStatus,
        actor: &str,
    ) -> Result<ExtractedEvent, StoreError> {
        if to == EventStatus::Created {
            return Err(StoreError::InvalidTransition {
                from: "any".into(),
                to: "created (use materialise)".into(),
            });
        }
        let db_path = self.db_path.clone();
        let actor = actor.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let event = fetch_event(&tx, id)?;
            if !event.status.can_transition(to) {
                return Err(StoreError::InvalidTransition {
                    from: event.status.as_str().into(),
                    to: to.as_str().into(),
                });
            }
            tx.execute(
                "UPDATE extracted_events SET status = ?2 WHERE id = ?1",
                params![id, to.as_str()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO audit_log (at, action, actor, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Utc::now().to_rfc3339(),
                    "event_transition",
                    actor,
                    serde_json::json!({"event_id": id, "to": to.as_str()}).to_string()
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(ExtractedEvent {
                status: to,
                ..event
            })
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// `confirmed -> created`: writes the CalendarEvent row, the status update
    /// and the audit record in one transaction.
    pub async fn materialise(
        &self,
        id: i64,
        provider: &str,
        provider_event_id: &str,
        calendar_id: &str,
    ) -> Result<CalendarEvent, StoreError> {
        let db_path = self.db_path.clone();
        let provider = provider.to_string();
        let provider_event_id = provider_event_id.to_string();
        let calendar_id = calendar_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let event = fetch_event(&tx, id)?;
            if !event.status.can_transition(EventStatus::Created) {
                return Err(StoreError::InvalidTransition {
                    from: event.status.as_str().into(),
                    to: "created".into(),
                });
            }
            let now = Utc::now();
            tx.execute(
                "UPDATE extracted_events SET status = 'created' WHERE id = ?1",
                params![id],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                r#"
                INSERT INTO calendar_events
                    (provider, provider_event_id, calendar_id, title, start_at, end_at,
                     status, last_sync_at, extracted_event_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'confirmed', ?7, ?8)
                "#,
                params![
                    provider,
                    provider_event_id,
                    calendar_id,
                    event.title,
                    event.start_at.to_rfc3339(),
                    event.end_at.map(|d| d.to_rfc3339()),
                    now.to_rfc3339(),
                    id
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO audit_log (at, action, actor, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    now.to_rfc3339(),
                    "event_materialised",
                    "user",
                    serde_json::json!({
                        "event_id": id,
                        "provider": provider,
                        "provider_event_id": provider_event_id
                    })
                    .to_string()
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(CalendarEvent {
                provider,
                provider_event_id,
                calendar_id,
                title: event.title,
                start_at: event.start_at,
                end_at: event.end_at,
                status: CalendarEventStatus::Confirmed,
                last_sync_at: now,
                extracted_event_id: Some(id),
            })
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// The CalendarEvent referencing an extracted event, if materialised.
    pub async fn calendar_event_for(
        &self,
        extracted_event_id: i64,
    ) -> Result<Option<CalendarEvent>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT provider, provider_event_id, calendar_id, title, start_at, end_at,
                           status, last_sync_at, extracted_event_id
                    FROM calendar_events WHERE extracted_event_id = ?1
                    "#,
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![extracted_event_id], |row| {
                    let start_at: String = row.get(4)?;
                    let end_at: Option<String> = row.get(5)?;
                    let status: String = row.get(6)?;
                    let last_sync_at: String = row.get(7)?;
                    Ok(CalendarEvent {
                        provider: row.get(0)?,
                        provider_event_id: row.get(1)?,
                        calendar_id: row.get(2)?,
                        title: row.get(3)?,
                        start_at: parse_rfc3339(&start_at),
                        end_at: end_at.as_deref().map(parse_rfc3339),
                        status: match status.as_str() {
                            "cancelled" => CalendarEventStatus::Cancelled,
                            "tentative" => CalendarEventStatus::Tentative,
                            _ => CalendarEventStatus::Confirmed,
                        },
                        last_sync_at: parse_rfc3339(&last_sync_at),
                        extracted_event_id: row.get(8)?,
                    })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            match rows.next() {
                Some(r) => Ok(Some(r.map_err(|e| StoreError::Storage(e.to_string()))?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

const SELECT_EVENT: &str = r#"
    SELECT id, source, title, start_at, end_at, timezone, location, attendees,
           status, confidence, relevance_score
    FROM extracted_events
"#;

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn fetch_event(conn: &rusqlite::Connection, id: i64) -> Result<ExtractedEvent, StoreError> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_EVENT} WHERE id = ?1"))
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    let mut rows = stmt
        .query_map(params![id], row_to_event)
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    match rows.next() {
        Some(r) => r.map_err(|e| StoreError::Storage(e.to_string())),
        None => Err(StoreError::NotFound(format!("event {id}"))),
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractedEvent> {
    let start_at: String = row.get(3)?;
    let end_at: Option<String> = row.get(4)?;
    let attendees: String = row.get(7)?;
    let status: String = row.get(8)?;
    Ok(ExtractedEvent {
        id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        start_at: parse_rfc3339(&start_at),
        end_at: end_at.as_deref().map(parse_rfc3339),
        timezone: row.get(5)?,
        location: row.get(6)?,
        attendees: serde_json::from_str(&attendees).unwrap_or_default(),
        status: EventStatus::parse(&status).unwrap_or(EventStatus::Proposed),
        confidence: row.get(9)?,
        relevance_score: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(title: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> NewExtractedEvent {
        NewExtractedEvent {
            source: "whatsapp".into(),
            title: title.into(),
            start_at: start,
            end_at: end,
            timezone: "Europe/Madrid".into(),
            location: None,
            attendees: vec![],
            status: EventStatus::Proposed,
            confidence: 0.9,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn transitions_are_forward_only() {
        assert!(EventStatus::Proposed.can_transition(EventStatus::Confirmed));
        assert!(EventStatus::Suggested.can_transition(EventStatus::Confirmed));
        assert!(EventStatus::Confirmed.can_transition(EventStatus::Created));
        assert!(EventStatus::Confirmed.can_transition(EventStatus::Rejected));
        assert!(!EventStatus::Created.can_transition(EventStatus::Confirmed));
        assert!(!EventStatus::Rejected.can_transition(EventStatus::Confirmed));
        assert!(!EventStatus::Proposed.can_transition(EventStatus::Created));
    }

    #[tokio::test]
    async fn insert_rejects_inverted_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        let err = store
            .insert(event("x", at(2025, 12, 16, 12), Some(at(2025, 12, 16, 11))))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn overlap_detects_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        store
            .insert(event(
                "Entrevista",
                at(2025, 12, 16, 10),
                Some(at(2025, 12, 16, 11)),
            ))
            .await
            .unwrap();

        let hits = store
            .overlapping(at(2025, 12, 16, 10), at(2025, 12, 16, 12))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .overlapping(at(2025, 12, 16, 11), at(2025, 12, 16, 12))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn overlap_defaults_open_ended_events_to_one_hour() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        store
            .insert(event("Sin fin", at(2025, 12, 16, 10), None))
            .await
            .unwrap();

        let hits = store
            .overlapping(at(2025, 12, 16, 10), at(2025, 12, 16, 11))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store
            .overlapping(at(2025, 12, 16, 11), at(2025, 12, 16, 12))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn materialise_creates_calendar_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        let id = store
            .insert(event(
                "Revisión del proyecto",
                at(2025, 12, 19, 10),
                Some(at(2025, 12, 19, 11)),
            ))
            .await
            .unwrap();

        store
            .transition(id, EventStatus::Confirmed, "user")
            .await
            .unwrap();
        let cal = store
            .materialise(id, "google", "gcal-123", "primary")
            .await
            .unwrap();
        assert_eq!(cal.provider_event_id, "gcal-123");

        let back = store.get(id).await.unwrap().unwrap();
        assert_eq!(back.status, EventStatus::Created);
        let linked = store.calendar_event_for(id).await.unwrap().unwrap();
        assert_eq!(linked.provider, "google");
    }

    #[tokio::test]
    async fn invalid_transition_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        let id = store
            .insert(event("x", at(2025, 12, 16, 10), None))
            .await
            .unwrap();
        // proposed -> created without confirmation
        let err = store.materialise(id, "google", "g1", "primary").await;
        assert!(matches!(err, Err(StoreError::InvalidTransition { .. })));

        store.transition(id, EventStatus::Rejected, "user").await.unwrap();
        let err = store.transition(id, EventStatus::Confirmed, "user").await;
        assert!(matches!(err, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn upcoming_excludes_rejected_and_past() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("e.db")).unwrap();
        store
            .insert(event("pasado", at(2025, 12, 10, 10), None))
            .await
            .unwrap();
        let future = store
            .insert(event("futuro", at(2025, 12, 20, 10), None))
            .await
            .unwrap();
        let rejected = store
            .insert(event("rechazado", at(2025, 12, 21, 10), None))
            .await
            .unwrap();
        store
            .transition(rejected, EventStatus::Rejected, "user")
            .await
            .unwrap();

        let upcoming = store.upcoming(at(2025, 12, 15, 0), 10).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, future);
    }
}
