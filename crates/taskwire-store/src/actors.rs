//! Actor (chat participant) and department records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use taskwire_core::error::Result;

use crate::{parse_ts, storage, ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Boss,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Boss => "boss",
            Role::Worker => "worker",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "boss" => Role::Boss,
            _ => Role::Worker,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: i64,
    pub tg_id: i64,
    pub username: Option<String>,
    pub role: Role,
    pub name: Option<String>,
    pub team: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

fn actor_from_row(row: &Row<'_>) -> rusqlite::Result<Actor> {
    Ok(Actor {
        id: row.get(0)?,
        tg_id: row.get(1)?,
        username: row.get(2)?,
        role: Role::from_str(&row.get::<_, String>(3)?),
        name: row.get(4)?,
        team: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

const ACTOR_COLS: &str = "id, tg_id, username, role, name, team, created_at";

impl Store {
    /// Create the actor on first contact, or refresh its username.
    /// The stored role is set on first insert and not rewritten afterwards.
    pub fn upsert_actor(&self, tg_id: i64, username: Option<&str>, role: Role) -> Result<Actor> {
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO actors (tg_id, username, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(tg_id) DO UPDATE SET username = excluded.username",
                params![tg_id, username, role.as_str(), ts(Utc::now())],
            )
            .map_err(storage)?;
        }
        self.actor_by_tg(tg_id)?.ok_or_else(|| {
            taskwire_core::error::TaskwireError::Storage(format!(
                "actor {tg_id} missing after upsert"
            ))
        })
    }

    pub fn actor_by_tg(&self, tg_id: i64) -> Result<Option<Actor>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ACTOR_COLS} FROM actors WHERE tg_id = ?1"),
            [tg_id],
            actor_from_row,
        )
        .optional()
        .map_err(storage)
    }

    pub fn actor_by_id(&self, id: i64) -> Result<Option<Actor>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ACTOR_COLS} FROM actors WHERE id = ?1"),
            [id],
            actor_from_row,
        )
        .optional()
        .map_err(storage)
    }

    /// Fill in the profile collected by the registration flow.
    pub fn set_profile(&self, tg_id: i64, name: &str, team: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE actors SET name = ?1, team = ?2 WHERE tg_id = ?3",
            params![name, team, tg_id],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn list_teams(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT team FROM actors
                 WHERE role = 'worker' AND team IS NOT NULL AND team <> ''
                 ORDER BY team",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    pub fn workers_by_team(&self, team: &str) -> Result<Vec<Actor>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACTOR_COLS} FROM actors
                 WHERE role = 'worker' AND team = ?1 ORDER BY name"
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([team], actor_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    pub fn all_workers(&self) -> Result<Vec<Actor>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACTOR_COLS} FROM actors WHERE role = 'worker' ORDER BY team, name"
            ))
            .map_err(storage)?;
        let rows = stmt.query_map([], actor_from_row).map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    /// Delete a worker. Returns the number of deleted rows (0 or 1).
    ///
    /// Cascade: assignment rows keep their task with a NULL actor; pending
    /// before/deadline reminders for the actor are deleted; pending overdue
    /// reminders survive with the actor reference nulled (the FK handles
    /// that), so the creator still gets one orphaned-task nudge. Results are
    /// retained with a NULL actor.
    pub fn delete_worker(&self, tg_id: i64) -> Result<u64> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM reminders
             WHERE sent = 0
               AND kind IN ('before', 'deadline')
               AND actor_id = (SELECT id FROM actors WHERE tg_id = ?1)",
            [tg_id],
        )
        .map_err(storage)?;
        let n = conn
            .execute(
                "DELETE FROM actors WHERE tg_id = ?1 AND role = 'worker'",
                [tg_id],
            )
            .map_err(storage)?;
        Ok(n as u64)
    }

    pub fn create_department(&self, name: &str, created_by: Option<i64>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO departments (name, created_at, created_by) VALUES (?1, ?2, ?3)",
            params![name, ts(Utc::now()), created_by],
        )
        .map_err(storage)?;
        conn.query_row(
            "SELECT id FROM departments WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .map_err(storage)
    }

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM departments ORDER BY name")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Department {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }
}
