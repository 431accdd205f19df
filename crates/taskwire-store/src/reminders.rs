//! Scheduled one-shot reminder rows.

use chrono::{DateTime, Utc};
use rusqlite::params;
use taskwire_core::error::Result;

use crate::{parse_ts, storage, ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Before,
    Deadline,
    Overdue,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Before => "before",
            ReminderKind::Deadline => "deadline",
            ReminderKind::Overdue => "overdue",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "deadline" => ReminderKind::Deadline,
            "overdue" => ReminderKind::Overdue,
            _ => ReminderKind::Before,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: i64,
    pub task_id: i64,
    pub actor_id: Option<i64>,
    pub at: DateTime<Utc>,
    pub kind: ReminderKind,
}

impl Store {
    /// Insert one reminder row per (actor, fire time). Fire-time filtering
    /// happens at the caller; this persists exactly what it is given.
    pub fn add_reminders(
        &self,
        task_id: i64,
        actor_ids: &[i64],
        times: &[DateTime<Utc>],
        kind: ReminderKind,
    ) -> Result<()> {
        let conn = self.conn()?;
        for actor_id in actor_ids {
            for at in times {
                conn.execute(
                    "INSERT INTO reminders (task_id, actor_id, at, kind, sent)
                     VALUES (?1, ?2, ?3, ?4, 0)",
                    params![task_id, actor_id, ts(*at), kind.as_str()],
                )
                .map_err(storage)?;
            }
        }
        Ok(())
    }

    /// Unsent reminders due at or before `until`, earliest first. Capped at
    /// 100 per call to bound lateness under backlog; the next tick drains on.
    pub fn due_reminders(&self, until: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, task_id, actor_id, at, kind FROM reminders
                 WHERE sent = 0 AND at <= ?1
                 ORDER BY at
                 LIMIT 100",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([ts(until)], |row| {
                Ok(Reminder {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    actor_id: row.get(2)?,
                    at: parse_ts(&row.get::<_, String>(3)?),
                    kind: ReminderKind::from_str(&row.get::<_, String>(4)?),
                })
            })
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    /// Monotonic false→true flip; never reverts.
    pub fn mark_reminder_sent(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE reminders SET sent = 1 WHERE id = ?1", [id])
            .map_err(storage)?;
        Ok(())
    }

    /// Silence all pending reminders for a (task, actor) pair, used when the
    /// pair is marked done.
    pub fn mark_pair_reminders_sent(&self, task_id: i64, actor_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE reminders SET sent = 1
             WHERE task_id = ?1 AND actor_id = ?2 AND sent = 0",
            params![task_id, actor_id],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// Pending (unsent) reminders for a task, used by tests and inspection.
    pub fn pending_reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, task_id, actor_id, at, kind FROM reminders
                 WHERE task_id = ?1 AND sent = 0
                 ORDER BY at",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([task_id], |row| {
                Ok(Reminder {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    actor_id: row.get(2)?,
                    at: parse_ts(&row.get::<_, String>(3)?),
                    kind: ReminderKind::from_str(&row.get::<_, String>(4)?),
                })
            })
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }
}
