//! Tasks, per-assignee execution records and submitted results.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use taskwire_core::error::Result;

use crate::{opt_ts, parse_ts, storage, ts, Store};

#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub creator_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub voice_file_id: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters for a task row.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub creator_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub voice_file_id: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Per-(task, assignee) execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignStatus {
    New,
    InProgress,
    Done,
    Failed,
}

impl AssignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignStatus::New => "new",
            AssignStatus::InProgress => "in_progress",
            AssignStatus::Done => "done",
            AssignStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => AssignStatus::InProgress,
            "done" => AssignStatus::Done,
            "failed" => AssignStatus::Failed,
            _ => AssignStatus::New,
        }
    }
}

/// Assignment row joined with its actor, which may be gone (NULL).
#[derive(Debug, Clone)]
pub struct AssigneeView {
    pub actor_id: Option<i64>,
    pub tg_id: Option<i64>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub team: Option<String>,
    pub status: AssignStatus,
}

const TASK_COLS: &str =
    "id, creator_id, title, description, voice_file_id, due_at, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        voice_file_id: row.get(4)?,
        due_at: opt_ts(row.get(5)?),
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

impl Store {
    pub fn create_task(&self, task: &NewTask) -> Result<i64> {
        let now = ts(Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (creator_id, title, description, voice_file_id, due_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.creator_id,
                task.title,
                task.description,
                task.voice_file_id,
                task.due_at.map(ts),
                now,
                now,
            ],
        )
        .map_err(storage)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_assignee(&self, task_id: i64, actor_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_assignees (task_id, actor_id, status, updated_at)
             VALUES (?1, ?2, 'new', ?3)",
            params![task_id, actor_id, ts(Utc::now())],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
            [id],
            task_from_row,
        )
        .optional()
        .map_err(storage)
    }

    /// Delete a task; assignments, reminders and results go with it.
    /// Returns false if no such task existed.
    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute("DELETE FROM tasks WHERE id = ?1", [id])
            .map_err(storage)?;
        Ok(n > 0)
    }

    /// Explicit accept: re-enters in_progress from any current status.
    /// Returns false when the assignment row does not exist.
    pub fn set_in_progress(&self, task_id: i64, actor_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE task_assignees SET status = 'in_progress', updated_at = ?1
                 WHERE task_id = ?2 AND actor_id = ?3",
                params![ts(Utc::now()), task_id, actor_id],
            )
            .map_err(storage)?;
        Ok(n > 0)
    }

    /// Conditional transition to done. Returns true when this call changed
    /// the row; false means it was already done (a no-op for the caller).
    /// The result-exists precondition is checked by the lifecycle layer.
    pub fn mark_done(&self, task_id: i64, actor_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE task_assignees SET status = 'done', updated_at = ?1
                 WHERE task_id = ?2 AND actor_id = ?3 AND status <> 'done'",
                params![ts(Utc::now()), task_id, actor_id],
            )
            .map_err(storage)?;
        Ok(n > 0)
    }

    /// Transition to failed from new/in_progress only; done and failed are
    /// terminal for this edge.
    pub fn mark_failed(&self, task_id: i64, actor_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE task_assignees SET status = 'failed', updated_at = ?1
                 WHERE task_id = ?2 AND actor_id = ?3 AND status IN ('new', 'in_progress')",
                params![ts(Utc::now()), task_id, actor_id],
            )
            .map_err(storage)?;
        Ok(n > 0)
    }

    pub fn assignment_status(&self, task_id: i64, actor_id: i64) -> Result<Option<AssignStatus>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT status FROM task_assignees WHERE task_id = ?1 AND actor_id = ?2",
            params![task_id, actor_id],
            |row| Ok(AssignStatus::from_str(&row.get::<_, String>(0)?)),
        )
        .optional()
        .map_err(storage)
    }

    /// Append a submitted result. Multiple submissions per pair are allowed.
    pub fn add_result(
        &self,
        task_id: i64,
        actor_id: i64,
        text: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_results (task_id, actor_id, text, file_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_id, actor_id, text, file_id, ts(Utc::now())],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn has_result(&self, task_id: i64, actor_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_results WHERE task_id = ?1 AND actor_id = ?2 LIMIT 1",
                params![task_id, actor_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(found.is_some())
    }

    /// Lifecycle query used by the scheduler to suppress overdue nudges:
    /// the pair counts as handled once it is done or has any result.
    pub fn pair_completed(&self, task_id: i64, actor_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_assignees ta
                 WHERE ta.task_id = ?1 AND ta.actor_id = ?2
                   AND (ta.status = 'done'
                        OR EXISTS (SELECT 1 FROM task_results r
                                   WHERE r.task_id = ta.task_id AND r.actor_id = ta.actor_id))
                 LIMIT 1",
                params![task_id, actor_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(found.is_some())
    }

    pub fn active_tasks_for_actor(&self, actor_id: i64) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT t.{} FROM tasks t
                 JOIN task_assignees ta ON ta.task_id = t.id
                 WHERE ta.actor_id = ?1 AND ta.status <> 'done'
                 ORDER BY t.created_at DESC",
                TASK_COLS.replace(", ", ", t.")
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([actor_id], task_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    pub fn active_tasks_for_team(&self, team: &str) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT t.{} FROM tasks t
                 JOIN task_assignees ta ON ta.task_id = t.id
                 JOIN actors a ON a.id = ta.actor_id
                 WHERE a.team = ?1 AND ta.status <> 'done'
                 ORDER BY t.created_at DESC",
                TASK_COLS.replace(", ", ", t.")
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([team], task_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    pub fn active_tasks_all(&self) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT t.{} FROM tasks t
                 JOIN task_assignees ta ON ta.task_id = t.id
                 WHERE ta.status <> 'done'
                 ORDER BY t.created_at DESC",
                TASK_COLS.replace(", ", ", t.")
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([], task_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    /// Completed tasks for an actor, with the completion timestamp.
    pub fn done_tasks_for_actor(&self, actor_id: i64) -> Result<Vec<(Task, DateTime<Utc>)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT t.{}, ta.updated_at FROM tasks t
                 JOIN task_assignees ta ON ta.task_id = t.id
                 WHERE ta.actor_id = ?1 AND ta.status = 'done'
                 ORDER BY ta.updated_at DESC",
                TASK_COLS.replace(", ", ", t.")
            ))
            .map_err(storage)?;
        let rows = stmt
            .query_map([actor_id], |row| {
                Ok((task_from_row(row)?, parse_ts(&row.get::<_, String>(8)?)))
            })
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    /// Assignment rows for a task joined with actor info. Rows whose actor
    /// was deleted come back with NULL actor fields.
    pub fn assignees_with_actors(&self, task_id: i64) -> Result<Vec<AssigneeView>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ta.actor_id, a.tg_id, a.name, a.username, a.team, ta.status
                 FROM task_assignees ta
                 LEFT JOIN actors a ON a.id = ta.actor_id
                 WHERE ta.task_id = ?1
                 ORDER BY a.team, a.name",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([task_id], |row| {
                Ok(AssigneeView {
                    actor_id: row.get(0)?,
                    tg_id: row.get(1)?,
                    name: row.get(2)?,
                    username: row.get(3)?,
                    team: row.get(4)?,
                    status: AssignStatus::from_str(&row.get::<_, String>(5)?),
                })
            })
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }
}
