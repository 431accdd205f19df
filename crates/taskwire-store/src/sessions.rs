//! Per-actor wizard session records.
//!
//! The session row is the sole source of truth for what an actor's next
//! free-text or file message means. The state and its payload travel
//! together as one tagged sum type, so a payload can never belong to the
//! wrong state.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use taskwire_core::error::{Result, TaskwireError};

use crate::{storage, ts, Store};

/// Wizard state plus its draft payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    RegName,
    RegTeam { name: String },
    TaskTitle { draft: TaskDraft },
    TaskBody { draft: TaskDraft },
    TaskAssignees { draft: TaskDraft },
    TaskDeadline { draft: TaskDraft },
    TaskReminders { draft: TaskDraft },
    AwaitResult { task_id: i64 },
    ErrorReport,
}

impl SessionState {
    /// Short tag stored alongside the payload, for ad-hoc inspection.
    pub fn tag(&self) -> &'static str {
        match self {
            SessionState::RegName => "reg_name",
            SessionState::RegTeam { .. } => "reg_team",
            SessionState::TaskTitle { .. } => "task_title",
            SessionState::TaskBody { .. } => "task_body",
            SessionState::TaskAssignees { .. } => "task_assignees",
            SessionState::TaskDeadline { .. } => "task_deadline",
            SessionState::TaskReminders { .. } => "task_reminders",
            SessionState::AwaitResult { .. } => "await_result",
            SessionState::ErrorReport => "error_report",
        }
    }
}

/// In-progress task-creation payload. Lives only inside a session row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub voice_file_id: Option<String>,
    /// Candidate assignees by platform id. Kept deduplicated by `toggle`.
    #[serde(default)]
    pub assignee_tg_ids: Vec<i64>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Reminder lead-times in hours, sorted ascending.
    #[serde(default)]
    pub remind_hours: Vec<i64>,
}

impl TaskDraft {
    /// Symmetric-difference toggle: present → removed, absent → appended.
    pub fn toggle_assignee(&mut self, tg_id: i64) {
        if let Some(pos) = self.assignee_tg_ids.iter().position(|&id| id == tg_id) {
            self.assignee_tg_ids.remove(pos);
        } else {
            self.assignee_tg_ids.push(tg_id);
        }
    }
}

impl Store {
    /// Upsert the actor's session, replacing any prior state and payload.
    pub fn save_session(&self, actor_tg_id: i64, state: &SessionState) -> Result<()> {
        let payload = serde_json::to_string(state)
            .map_err(|e| TaskwireError::Storage(format!("encode session: {e}")))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (actor_id, state, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(actor_id) DO UPDATE SET
                 state = excluded.state,
                 payload = excluded.payload,
                 updated_at = excluded.updated_at",
            params![actor_tg_id, state.tag(), payload, ts(Utc::now())],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// Load the actor's session, or `None` if no flow is active.
    pub fn load_session(&self, actor_tg_id: i64) -> Result<Option<SessionState>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM sessions WHERE actor_id = ?1",
                [actor_tg_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        match payload {
            Some(p) => serde_json::from_str(&p)
                .map(Some)
                .map_err(|e| TaskwireError::Storage(format!("decode session: {e}"))),
            None => Ok(None),
        }
    }

    /// Idempotent delete.
    pub fn clear_session(&self, actor_tg_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE actor_id = ?1", [actor_tg_id])
            .map_err(storage)?;
        Ok(())
    }
}
