//! SQLite event store implementation.

use crate::{Error, Event, EventKind, Result, SessionId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::Deserialize;
use std::path::Path;

/// SQLite-backed event store.
pub struct EventStore {
    conn: Connection,
}

/// One row of [`EventStore::list_sessions`].
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    /// Agent name recorded at session start.
    pub agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub instruction_count: u64,
    pub failure_count: u64,
}

#[derive(Deserialize)]
struct SummaryRow {
    session_id: String,
    started_at: String,
    ended_at: Option<String>,
    instruction_count: i64,
    failure_count: i64,
    agent: Option<String>,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load all events for a session in append order.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Load a session's events, optionally keeping only one kind.
    ///
    /// `kind` must be one of [`EventKind::NAMES`].
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        if let Some(kind) = kind
            && !EventKind::NAMES.contains(&kind)
        {
            return Err(Error::NotFound(format!("event kind '{kind}'")));
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![session_id.to_string(), kind], |row| {
            let id: String = row.get(0)?;
            let session_id: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            let data: String = row.get(3)?;
            Ok((id, session_id, timestamp, data))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, timestamp, data) = row?;
            events.push(Event {
                id: id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("event id {id}: {e}")))?,
                session_id: session_id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("session id {session_id}: {e}")))?,
                timestamp: parse_timestamp(&timestamp)?,
                kind: serde_json::from_str(&data)?,
            });
        }
        Ok(events)
    }

    /// Summarize every stored session, most recent first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id,
                    MIN(timestamp) AS started_at,
                    MAX(CASE WHEN kind = 'session_end' THEN timestamp END) AS ended_at,
                    SUM(CASE WHEN kind = 'instruction' THEN 1 ELSE 0 END) AS instruction_count,
                    SUM(CASE WHEN kind = 'failure' THEN 1 ELSE 0 END) AS failure_count,
                    MAX(CASE WHEN kind = 'session_start'
                             THEN json_extract(data, '$.agent') END) AS agent
             FROM events
             GROUP BY session_id
             ORDER BY started_at DESC",
        )?;

        let mut summaries = Vec::new();
        for row in serde_rusqlite::from_rows::<SummaryRow>(stmt.query([])?) {
            let row = row?;
            summaries.push(SessionSummary {
                id: row
                    .session_id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("session id {}: {e}", row.session_id)))?,
                agent: row.agent,
                started_at: parse_timestamp(&row.started_at)?,
                ended_at: row.ended_at.as_deref().map(parse_timestamp).transpose()?,
                instruction_count: row.instruction_count.max(0) as u64,
                failure_count: row.failure_count.max(0) as u64,
            });
        }
        Ok(summaries)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(store: &EventStore, agent: &str, ended: bool) -> SessionId {
        let id = SessionId::new();
        store
            .append(&Event::new(
                id,
                EventKind::SessionStart {
                    agent: agent.into(),
                },
            ))
            .unwrap();
        store.append(&Event::instruction(id, "top products")).unwrap();
        store
            .append(&Event::new(
                id,
                EventKind::ToolCall {
                    name: "aggregate".into(),
                    input: json!({"collection": "orders"}),
                },
            ))
            .unwrap();
        store.append(&Event::reply(id, "Here you go")).unwrap();
        if ended {
            store.append(&Event::new(id, EventKind::SessionEnd)).unwrap();
        }
        id
    }

    #[test]
    fn events_load_in_append_order() {
        let store = EventStore::in_memory().unwrap();
        let id = seed(&store, "analyst", true);

        let kinds: Vec<_> = store
            .load_session(id)
            .unwrap()
            .into_iter()
            .map(|e| e.kind.name())
            .collect();
        assert_eq!(
            kinds,
            ["session_start", "instruction", "tool_call", "reply", "session_end"]
        );
    }

    #[test]
    fn load_events_filters_by_kind() {
        let store = EventStore::in_memory().unwrap();
        let id = seed(&store, "analyst", false);

        let replies = store.load_events(id, Some("reply")).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].kind,
            EventKind::Reply {
                content: "Here you go".into()
            }
        );
        assert!(matches!(
            store.load_events(id, Some("message")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn sessions_are_summarized() {
        let store = EventStore::in_memory().unwrap();
        let ended = seed(&store, "analyst", true);
        let active = seed(&store, "reporter", false);
        store
            .append(&Event::new(
                active,
                EventKind::Failure {
                    message: "model overloaded".into(),
                },
            ))
            .unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);

        let by_id = |id| sessions.iter().find(|s| s.id == id).unwrap();
        let ended = by_id(ended);
        assert_eq!(ended.agent.as_deref(), Some("analyst"));
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.instruction_count, 1);

        let active = by_id(active);
        assert!(active.ended_at.is_none());
        assert_eq!(active.failure_count, 1);
    }
}
