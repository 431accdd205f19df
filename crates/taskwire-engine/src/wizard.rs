//! Free-text and attachment transitions of the conversation state machine.
//!
//! Validation failures re-prompt in the same state; only a valid event
//! advances the wizard. Free text with no active session gets no reaction.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use taskwire_core::error::{Result, TaskwireError};
use taskwire_core::types::{Button, FileKind, Keyboard, Message};
use taskwire_store::{Actor, SessionState};

use crate::{callbacks, finalize, format, Engine};

pub(crate) async fn handle_text(engine: &Engine, actor: &Actor, msg: &Message) -> Result<()> {
    let Some(state) = engine.store().load_session(msg.actor_id)? else {
        return Ok(());
    };

    match state {
        SessionState::RegName => on_reg_name(engine, msg).await,
        SessionState::RegTeam { name } => on_reg_team(engine, msg, &name).await,
        SessionState::TaskTitle { draft } => on_task_title(engine, msg, draft).await,
        SessionState::TaskBody { draft } => on_task_body(engine, msg, draft).await,
        SessionState::TaskAssignees { .. } => {
            engine
                .reply(
                    msg.chat_id,
                    "Use the buttons to pick assignees, then press Next.",
                )
                .await;
            Ok(())
        }
        SessionState::TaskDeadline { draft } => on_task_deadline(engine, msg, draft).await,
        SessionState::TaskReminders { draft } => on_task_reminders(engine, actor, msg, draft).await,
        SessionState::AwaitResult { task_id } => on_result(engine, actor, msg, task_id).await,
        SessionState::ErrorReport => on_error_report(engine, actor, msg).await,
    }
}

async fn on_reg_name(engine: &Engine, msg: &Message) -> Result<()> {
    let name = msg.text.trim();
    if name.is_empty() {
        engine
            .reply(msg.chat_id, "Enter your full name as text.")
            .await;
        return Ok(());
    }
    engine.store().save_session(
        msg.actor_id,
        &SessionState::RegTeam { name: name.into() },
    )?;
    let departments = engine.store().list_departments()?;
    let mut kb = Keyboard::default();
    for dep in &departments {
        kb = kb.row(vec![Button::new(
            dep.name.clone(),
            format!("reg_team:{}", dep.name),
        )]);
    }
    if kb.rows.is_empty() {
        engine.reply(msg.chat_id, "Type your team (department) name:").await;
    } else {
        engine
            .reply_kb(msg.chat_id, "Pick your team, or type its name:", kb)
            .await;
    }
    Ok(())
}

async fn on_reg_team(engine: &Engine, msg: &Message, name: &str) -> Result<()> {
    let team = msg.text.trim();
    if team.is_empty() {
        engine.reply(msg.chat_id, "Type the team name as text.").await;
        return Ok(());
    }
    finish_registration(engine, msg.actor_id, msg.chat_id, name, team).await
}

/// Shared by the free-text path and the department-pick callback.
pub(crate) async fn finish_registration(
    engine: &Engine,
    actor_tg_id: i64,
    chat_id: i64,
    name: &str,
    team: &str,
) -> Result<()> {
    engine.store().set_profile(actor_tg_id, name, team)?;
    // Keep the department list in sync so future pickers offer this team.
    if let Err(e) = engine.store().create_department(team, None) {
        tracing::warn!("record department '{team}': {e}");
    }
    engine.store().clear_session(actor_tg_id)?;
    engine
        .reply(
            chat_id,
            &format!("Done! You are registered as {name} ({team})."),
        )
        .await;
    Ok(())
}

async fn on_task_title(
    engine: &Engine,
    msg: &Message,
    mut draft: taskwire_store::TaskDraft,
) -> Result<()> {
    let title = msg.text.trim();
    if title.is_empty() {
        engine
            .reply(msg.chat_id, "The title cannot be empty. Enter a short title:")
            .await;
        return Ok(());
    }
    draft.title = title.into();
    engine
        .store()
        .save_session(msg.actor_id, &SessionState::TaskBody { draft })?;
    engine
        .reply(
            msg.chat_id,
            "Describe the task with text, or send a voice message.",
        )
        .await;
    Ok(())
}

async fn on_task_body(
    engine: &Engine,
    msg: &Message,
    mut draft: taskwire_store::TaskDraft,
) -> Result<()> {
    let text = msg.text.trim();
    let voice = msg
        .file
        .as_ref()
        .filter(|f| matches!(f.kind, FileKind::Voice));
    if !text.is_empty() {
        draft.description = text.into();
    }
    if let Some(v) = voice {
        draft.voice_file_id = Some(v.file_id.clone());
    }
    if draft.description.is_empty() && draft.voice_file_id.is_none() {
        engine
            .reply(msg.chat_id, "Send a description as text or a voice message.")
            .await;
        return Ok(());
    }
    engine
        .store()
        .save_session(msg.actor_id, &SessionState::TaskAssignees { draft })?;
    callbacks::send_assignee_menu(engine, msg.chat_id).await
}

async fn on_task_deadline(
    engine: &Engine,
    msg: &Message,
    mut draft: taskwire_store::TaskDraft,
) -> Result<()> {
    let due = match parse_deadline(&msg.text, engine.tz()) {
        Ok(due) => due,
        Err(_) => {
            engine
                .reply(msg.chat_id, "Wrong format. Example: 28.08.2025 14:30")
                .await;
            return Ok(());
        }
    };
    draft.due_at = Some(due);
    engine
        .store()
        .save_session(msg.actor_id, &SessionState::TaskReminders { draft })?;
    engine
        .reply_kb(
            msg.chat_id,
            "Pick a reminder preset, or type HOURS before the deadline, \
             comma-separated (e.g. 48,24,6).",
            format::reminder_preset_keyboard(),
        )
        .await;
    Ok(())
}

async fn on_task_reminders(
    engine: &Engine,
    actor: &Actor,
    msg: &Message,
    mut draft: taskwire_store::TaskDraft,
) -> Result<()> {
    let hours = match parse_reminder_hours(&msg.text) {
        Ok(hours) => hours,
        Err(_) => {
            engine
                .reply(
                    msg.chat_id,
                    "Could not parse the hour list. Example: 48,24,6",
                )
                .await;
            return Ok(());
        }
    };
    draft.remind_hours = hours;
    finalize::create_from_draft(engine, msg.chat_id, actor, &draft).await?;
    engine.store().clear_session(msg.actor_id)?;
    Ok(())
}

async fn on_result(engine: &Engine, actor: &Actor, msg: &Message, task_id: i64) -> Result<()> {
    let text = Some(msg.text.trim()).filter(|t| !t.is_empty());
    let file = msg.file.as_ref();
    if text.is_none() && file.is_none() {
        engine
            .reply(msg.chat_id, "Send the result as text or a file.")
            .await;
        return Ok(());
    }

    let Some(task) = engine.store().get_task(task_id)? else {
        engine.store().clear_session(msg.actor_id)?;
        engine.reply(msg.chat_id, "The task no longer exists.").await;
        return Ok(());
    };

    engine
        .store()
        .add_result(task_id, actor.id, text, file.map(|f| f.file_id.as_str()))?;

    // Forward the submission to the creator.
    if let Some(creator) = engine.store().actor_by_id(task.creator_id)? {
        let who = actor.username.as_deref().unwrap_or("user");
        engine
            .reply(
                creator.tg_id,
                &format!("📎 Result received for task #{task_id} from @{who}"),
            )
            .await;
        if let Some(t) = text {
            engine.reply(creator.tg_id, t).await;
        }
        if let Some(f) = file {
            engine
                .gateway()
                .send_file(creator.tg_id, f)
                .await
                .log("forward result file");
        }
    }

    engine.store().clear_session(msg.actor_id)?;
    engine
        .reply_kb(
            msg.chat_id,
            "Result sent. You can now mark the task as done.",
            Keyboard::default().row(vec![
                Button::new("✔️ Done", format!("task_action:done:{task_id}")),
                Button::new("📎 Send more", format!("task_action:upload:{task_id}")),
            ]),
        )
        .await;
    Ok(())
}

async fn on_error_report(engine: &Engine, actor: &Actor, msg: &Message) -> Result<()> {
    if let Some(target) = engine.escalation_target() {
        let who = actor.username.as_deref().unwrap_or("user");
        engine
            .reply(target, &format!("⚠️ Problem report from @{who}:\n{}", msg.text))
            .await;
    }
    engine.store().clear_session(msg.actor_id)?;
    engine.reply(msg.chat_id, "Thanks, forwarded.").await;
    Ok(())
}

static DEADLINE_RE: OnceLock<Regex> = OnceLock::new();

/// Parse `DD.MM.YYYY HH:MM` in the configured offset. The regex gate keeps
/// the accepted shape strict; chrono then validates calendar ranges.
pub fn parse_deadline(s: &str, tz: FixedOffset) -> Result<DateTime<Utc>> {
    let s = s.trim();
    let re = DEADLINE_RE.get_or_init(|| {
        Regex::new(r"^([0-2]\d|3[01])\.(0\d|1[0-2])\.\d{4}\s([01]\d|2[0-3]):([0-5]\d)$")
            .expect("deadline regex is valid")
    });
    if !re.is_match(s) {
        return Err(TaskwireError::Validation(format!("bad deadline format: {s}")));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%d.%m.%Y %H:%M")
        .map_err(|e| TaskwireError::Validation(format!("bad deadline: {e}")))?;
    let local = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| TaskwireError::Validation("ambiguous local time".into()))?;
    Ok(local.with_timezone(&Utc))
}

/// Parse a comma-separated hour list. Whitespace is ignored, negatives are
/// clamped to zero, output is sorted ascending. Empty and "none" mean no
/// reminders.
pub fn parse_reminder_hours(s: &str) -> Result<Vec<i64>> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || compact.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }
    let mut hours = Vec::new();
    for part in compact.split(',') {
        let h: i64 = part
            .parse()
            .map_err(|_| TaskwireError::Validation(format!("bad hour value: {part}")))?;
        hours.push(h.max(0));
    }
    hours.sort_unstable();
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tz(minutes: i32) -> FixedOffset {
        FixedOffset::east_opt(minutes * 60).unwrap()
    }

    #[test]
    fn test_parse_deadline_applies_offset() {
        let due = parse_deadline("01.01.2026 09:00", tz(180)).unwrap();
        assert_eq!(due.to_rfc3339(), "2026-01-01T06:00:00+00:00");

        let due_utc = parse_deadline("01.01.2026 09:00", tz(0)).unwrap();
        assert_eq!(due_utc.to_rfc3339(), "2026-01-01T09:00:00+00:00");
    }

    #[test]
    fn test_parse_deadline_rejects_malformed() {
        for bad in [
            "tomorrow",
            "2026-01-01 09:00",
            "32.01.2026 09:00",
            "01.13.2026 09:00",
            "01.01.2026 24:00",
            "01.01.2026 09:61",
            "1.1.2026 09:00",
        ] {
            assert!(parse_deadline(bad, tz(0)).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_deadline_trims_whitespace() {
        assert!(parse_deadline("  28.08.2025 14:30  ", tz(0)).is_ok());
    }

    #[test]
    fn test_parse_reminder_hours() {
        assert_eq!(parse_reminder_hours("48,24,6").unwrap(), vec![6, 24, 48]);
        assert_eq!(parse_reminder_hours(" 24 , 2 ").unwrap(), vec![2, 24]);
        assert_eq!(parse_reminder_hours("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_reminder_hours("none").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_reminder_hours("-5,3").unwrap(), vec![0, 3]);
        assert!(parse_reminder_hours("6,three").is_err());
        assert!(parse_reminder_hours("6;3").is_err());
    }
}
