use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::HistoryStore;
use omniagent_core::types::{ChatMessage, Role, SessionId, SessionSummary};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_user
        ON sessions(user_id, created_at);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        name TEXT,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_messages_session
        ON messages(session_id, id);
";

fn db_err(e: rusqlite::Error) -> OmniError {
    OmniError::Persistence(e.to_string())
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// SQLite-backed chat history with soft delete.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OmniError::Persistence(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| OmniError::Persistence(e.to_string()))
    }

    /// Title and owner of a live session.
    pub fn session(&self, sid: &SessionId) -> Result<Option<SessionSummary>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT session_id, user_id, title, created_at FROM sessions
             WHERE session_id = ?1 AND deleted_at IS NULL",
            params![sid.as_str()],
            |row| {
                let created: String = row.get(3)?;
                Ok(SessionSummary {
                    session_id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: parse_ts(&created).unwrap_or_else(Utc::now),
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}

impl HistoryStore for SqliteStore {
    fn ensure_session(
        &self,
        sid: &SessionId,
        user_id: &str,
        title: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let user_id = user_id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            // Revives a soft-deleted row; a live row is left untouched.
            conn.execute(
                "INSERT INTO sessions (session_id, user_id, title, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     title = excluded.title,
                     created_at = excluded.created_at,
                     deleted_at = NULL
                 WHERE sessions.deleted_at IS NOT NULL",
                params![sid, user_id, title, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn append(&self, sid: &SessionId, msg: &ChatMessage) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let role = msg.role.as_str();
        let name = msg.name.clone();
        let content = serde_json::to_string(&msg.content);
        let created_at = msg.timestamp.unwrap_or_else(Utc::now).to_rfc3339();

        Box::pin(async move {
            let content = content?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO messages (session_id, role, name, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sid, role, name, content, created_at],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn load(&self, sid: &SessionId, limit: usize) -> BoxFuture<'_, Result<Vec<ChatMessage>>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT role, name, content, created_at FROM messages
                     WHERE session_id = ?1 AND deleted_at IS NULL
                     ORDER BY id DESC
                     LIMIT ?2",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![sid, limit as i64], |row| {
                    let role: String = row.get(0)?;
                    let name: Option<String> = row.get(1)?;
                    let content: String = row.get(2)?;
                    let ts: String = row.get(3)?;
                    Ok((role, name, content, ts))
                })
                .map_err(db_err)?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, name, content, ts) = row.map_err(db_err)?;
                messages.push(ChatMessage {
                    role: Role::parse(&role),
                    content: serde_json::from_str(&content)?,
                    name,
                    timestamp: parse_ts(&ts),
                });
            }
            messages.reverse();
            Ok(messages)
        })
    }

    fn soft_delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let mut conn = self.lock()?;
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "UPDATE sessions SET deleted_at = ?2 WHERE session_id = ?1 AND deleted_at IS NULL",
                params![sid, now],
            )
            .map_err(db_err)?;
            let hidden = tx
                .execute(
                    "UPDATE messages SET deleted_at = ?2 WHERE session_id = ?1 AND deleted_at IS NULL",
                    params![sid, now],
                )
                .map_err(db_err)?;
            tx.commit().map_err(db_err)?;
            debug!(session = %sid, messages = hidden, "Session soft-deleted");
            Ok(())
        })
    }

    fn list_sessions(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>>> {
        let user_id = user_id.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, user_id, title, created_at FROM sessions
                     WHERE user_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2 OFFSET ?3",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![user_id, limit as i64, offset as i64], |row| {
                    let created: String = row.get(3)?;
                    Ok(SessionSummary {
                        session_id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        created_at: parse_ts(&created).unwrap_or_else(Utc::now),
                    })
                })
                .map_err(db_err)?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(db_err)?);
            }
            Ok(sessions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let store = SqliteStore::in_memory().unwrap();
        let sid = SessionId::new();

        store.append(&sid, &ChatMessage::user("Hello")).await.unwrap();
        store
            .append(&sid, &ChatMessage::named("market_analysis_agent", "gm! 🚀"))
            .await
            .unwrap();

        let history = store.load(&sid, 100).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].name.as_deref(), Some("market_analysis_agent"));
        assert_eq!(history[1].text(), "gm! 🚀");
    }

    #[tokio::test]
    async fn test_load_keeps_most_recent_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let sid = SessionId::new();
        for i in 0..5 {
            store
                .append(&sid, &ChatMessage::user(format!("m{}", i)))
                .await
                .unwrap();
        }

        let texts: Vec<String> = store
            .load(&sid, 3)
            .await
            .unwrap()
            .iter()
            .map(|m| m.text())
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_history_and_session() {
        let store = SqliteStore::in_memory().unwrap();
        let sid = SessionId::from("s1");
        store.ensure_session(&sid, "u1", "ETH price").await.unwrap();
        store.append(&sid, &ChatMessage::user("old")).await.unwrap();

        store.soft_delete(&sid).await.unwrap();
        assert!(store.load(&sid, 10).await.unwrap().is_empty());
        assert!(store.list_sessions("u1", 0, 10).await.unwrap().is_empty());
        assert!(store.session(&sid).unwrap().is_none());

        // Reuse starts fresh
        store.ensure_session(&sid, "u1", "again").await.unwrap();
        store.append(&sid, &ChatMessage::user("new")).await.unwrap();
        let history = store.load(&sid, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text(), "new");
        assert_eq!(store.session(&sid).unwrap().unwrap().title, "again");
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first_per_user() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ensure_session(&SessionId::from("a"), "u1", "first")
            .await
            .unwrap();
        store
            .ensure_session(&SessionId::from("b"), "u1", "second")
            .await
            .unwrap();
        store
            .ensure_session(&SessionId::from("c"), "u2", "other")
            .await
            .unwrap();
        // Existing live session keeps its title
        store
            .ensure_session(&SessionId::from("a"), "u1", "renamed")
            .await
            .unwrap();

        let sessions = store.list_sessions("u1", 0, 10).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(sessions[1].title, "first");

        let page = store.list_sessions("u1", 1, 1).await.unwrap();
        assert_eq!(page[0].session_id, "a");
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let sid = SessionId::from("disk");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(&sid, &ChatMessage::user("persisted")).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load(&sid, 10).await.unwrap()[0].text(), "persisted");
    }
}
