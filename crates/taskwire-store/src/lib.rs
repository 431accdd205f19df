//! # Taskwire Store
//! SQLite-backed persistence. One connection behind a mutex; the engine and
//! the reminder scheduler share a [`Store`] handle and rely on the store
//! serializing individual statements.

pub mod actors;
pub mod reminders;
pub mod sessions;
pub mod tasks;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use taskwire_core::error::{Result, TaskwireError};

pub use actors::{Actor, Department, Role};
pub use reminders::{Reminder, ReminderKind};
pub use sessions::{SessionState, TaskDraft};
pub use tasks::{AssignStatus, AssigneeView, NewTask, Task};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(storage)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS actors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tg_id INTEGER UNIQUE NOT NULL,
                username TEXT,
                role TEXT NOT NULL,
                name TEXT,
                team TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                created_by INTEGER
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id INTEGER NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
                title TEXT,
                description TEXT,
                voice_file_id TEXT,
                due_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_assignees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                actor_id INTEGER REFERENCES actors(id) ON DELETE SET NULL,
                status TEXT NOT NULL DEFAULT 'new',
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_task_assignees_unique
                ON task_assignees(task_id, actor_id) WHERE actor_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS task_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                actor_id INTEGER REFERENCES actors(id) ON DELETE SET NULL,
                text TEXT,
                file_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                actor_id INTEGER REFERENCES actors(id) ON DELETE SET NULL,
                at TEXT NOT NULL,
                kind TEXT NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(sent, at);

            CREATE TABLE IF NOT EXISTS sessions (
                actor_id INTEGER PRIMARY KEY,
                state TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(storage)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TaskwireError::Storage(format!("connection lock poisoned: {e}")))
    }
}

pub(crate) fn storage(e: rusqlite::Error) -> TaskwireError {
    TaskwireError::Storage(e.to_string())
}

/// Timestamps are stored as second-precision RFC 3339 in UTC ('Z' suffix),
/// which keeps lexicographic `at <= ?` comparisons correct in SQL.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_session(1).unwrap().is_none());
    }

    #[test]
    fn test_open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("taskwire.db");
        let store = Store::open(&path).unwrap();
        drop(store);
        // Reopening runs migrations against the existing schema.
        let store = Store::open(&path).unwrap();
        assert!(store.all_workers().unwrap().is_empty());
    }

    #[test]
    fn test_ts_roundtrip_is_lexicographic_safe() {
        let a = Utc::now();
        let b = a + chrono::Duration::seconds(1);
        assert!(ts(a) < ts(b));
        assert_eq!(parse_ts(&ts(a)).timestamp(), a.timestamp());
    }
}
