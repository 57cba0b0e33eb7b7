//! SQLite-backed durable store (§6, §4.15): the checkpoint log, chat
//! history, and side-effect ledger that let a session resume exactly
//! where it left off and never re-issue an already-executed dispatch.
//!
//! Three tables keyed by session-id, per §6's reference layout:
//! `checkpoints(id, session_id, stage, snapshot_json, metadata_json,
//! created_at)`, `chat_history(id, session_id, role, content,
//! created_at)`, `side_effects(session_id, effect_id UNIQUE,
//! executed_at)`.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CheckpointerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("snapshot is not valid JSON: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),
    #[error("no checkpoint found for session {0}")]
    NotFound(String),
    #[error("blocking task panicked: {0}")]
    TaskPanic(String),
}

/// A single row from the checkpoint log.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: String,
    pub stage: String,
    pub snapshot_json: String,
    pub metadata_json: Option<Value>,
    pub created_at: String,
}

/// A single row from the chat history.
#[derive(Debug, Clone)]
pub struct ChatHistoryEntry {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// SQLite-backed implementation of the checkpointer contract (§6).
#[derive(Clone)]
pub struct Checkpointer {
    conn: Arc<Mutex<Connection>>,
}

impl Checkpointer {
    pub fn open(path: &str) -> Result<Self, CheckpointerError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CheckpointerError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), CheckpointerError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id            TEXT NOT NULL PRIMARY KEY,
                session_id    TEXT NOT NULL,
                stage         TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                metadata_json TEXT,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, created_at);

            CREATE TABLE IF NOT EXISTS chat_history (
                id         TEXT NOT NULL PRIMARY KEY,
                session_id TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history(session_id, created_at);

            CREATE TABLE IF NOT EXISTS side_effects (
                session_id  TEXT NOT NULL,
                effect_id   TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                PRIMARY KEY (session_id, effect_id)
            );",
        )?;
        Ok(())
    }

    /// Appends a checkpoint and returns its id.
    pub async fn save(
        &self,
        session_id: &str,
        snapshot: &Value,
        stage: &str,
        metadata: Option<Value>,
    ) -> Result<String, CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let snapshot_json = serde_json::to_string(snapshot)?;
        let stage = stage.to_owned();
        let metadata_json = metadata.map(|m| serde_json::to_string(&m)).transpose()?;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO checkpoints (id, session_id, stage, snapshot_json, metadata_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, session_id, stage, snapshot_json, metadata_json, now],
            )?;
            Ok(id)
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    /// Loads a checkpoint by id, or the most recent checkpoint for the
    /// session when `checkpoint_id` is `None`.
    pub async fn load(
        &self,
        session_id: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let checkpoint_id = checkpoint_id.map(str::to_owned);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let result = match &checkpoint_id {
                Some(id) => conn.query_row(
                    "SELECT id, stage, snapshot_json, metadata_json, created_at
                     FROM checkpoints WHERE session_id = ?1 AND id = ?2",
                    params![session_id, id],
                    row_to_checkpoint,
                ),
                None => conn.query_row(
                    "SELECT id, stage, snapshot_json, metadata_json, created_at
                     FROM checkpoints WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    params![session_id],
                    row_to_checkpoint,
                ),
            };
            match result {
                Ok(checkpoint) => Ok(Some(checkpoint)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(CheckpointerError::Sqlite(e)),
            }
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    /// The most recent `limit` checkpoints for a session, newest first.
    pub async fn list(&self, session_id: &str, limit: u32) -> Result<Vec<Checkpoint>, CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare(
                "SELECT id, stage, snapshot_json, metadata_json, created_at
                 FROM checkpoints WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit], row_to_checkpoint)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(CheckpointerError::from)
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    pub async fn append_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let role = role.to_owned();
        let content = content.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO chat_history (id, session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, session_id, role, content, now],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    /// The most recent `limit` chat messages for a session, oldest first.
    pub async fn load_history(&self, session_id: &str, limit: u32) -> Result<Vec<ChatHistoryEntry>, CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare(
                "SELECT role, content, created_at FROM
                 (SELECT role, content, created_at, rowid FROM chat_history
                  WHERE session_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2)
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![session_id, limit], |row| {
                Ok(ChatHistoryEntry { role: row.get(0)?, content: row.get(1)?, created_at: row.get(2)? })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(CheckpointerError::from)
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    /// Records that `effect_id` has been executed for `session_id`. Safe to
    /// call more than once for the same effect-id (§9 idempotency).
    pub async fn mark_effect(&self, session_id: &str, effect_id: &str) -> Result<(), CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let effect_id = effect_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO side_effects (session_id, effect_id, executed_at) VALUES (?1, ?2, ?3)",
                params![session_id, effect_id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }

    pub async fn effect_executed(&self, session_id: &str, effect_id: &str) -> Result<bool, CheckpointerError> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let effect_id = effect_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM side_effects WHERE session_id = ?1 AND effect_id = ?2",
                params![session_id, effect_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(|e| CheckpointerError::TaskPanic(e.to_string()))?
    }
}

fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
    let metadata_raw: Option<String> = row.get(3)?;
    Ok(Checkpoint {
        id: row.get(0)?,
        stage: row.get(1)?,
        snapshot_json: row.get(2)?,
        metadata_json: metadata_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_returns_latest_checkpoint() {
        let store = Checkpointer::open_in_memory().unwrap();
        store.save("s1", &json!({"iter": 1}), "K1", None).await.unwrap();
        store.save("s1", &json!({"iter": 2}), "K2", None).await.unwrap();
        let checkpoint = store.load("s1", None).await.unwrap().unwrap();
        assert_eq!(checkpoint.stage, "K2");
    }

    #[tokio::test]
    async fn load_by_id_returns_that_specific_checkpoint() {
        let store = Checkpointer::open_in_memory().unwrap();
        let id = store.save("s1", &json!({"iter": 1}), "K1", None).await.unwrap();
        store.save("s1", &json!({"iter": 2}), "K2", None).await.unwrap();
        let checkpoint = store.load("s1", Some(&id)).await.unwrap().unwrap();
        assert_eq!(checkpoint.stage, "K1");
    }

    #[tokio::test]
    async fn load_with_no_checkpoints_returns_none() {
        let store = Checkpointer::open_in_memory().unwrap();
        assert!(store.load("s1", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_newest_first_bounded_by_limit() {
        let store = Checkpointer::open_in_memory().unwrap();
        for stage in ["K1", "K2", "K3"] {
            store.save("s1", &json!({}), stage, None).await.unwrap();
        }
        let checkpoints = store.list("s1", 2).await.unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].stage, "K3");
    }

    #[tokio::test]
    async fn append_and_load_history_preserves_chronological_order() {
        let store = Checkpointer::open_in_memory().unwrap();
        store.append_message("s1", "user", "go to kitchen").await.unwrap();
        store.append_message("s1", "assistant", "ok").await.unwrap();
        let history = store.load_history("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test]
    async fn mark_effect_is_idempotent() {
        let store = Checkpointer::open_in_memory().unwrap();
        store.mark_effect("s1", "s1:0:0").await.unwrap();
        store.mark_effect("s1", "s1:0:0").await.unwrap();
        assert!(store.effect_executed("s1", "s1:0:0").await.unwrap());
    }

    #[tokio::test]
    async fn unmarked_effect_is_not_executed() {
        let store = Checkpointer::open_in_memory().unwrap();
        assert!(!store.effect_executed("s1", "s1:0:0").await.unwrap());
    }

    #[tokio::test]
    async fn checkpoints_are_isolated_per_session() {
        let store = Checkpointer::open_in_memory().unwrap();
        store.save("s1", &json!({}), "K1", None).await.unwrap();
        assert!(store.load("s2", None).await.unwrap().is_none());
    }
}
