//! Inline-button press handling. Payload grammar:
//! `pick_team:<team>`, `pick_people`, `assignees_menu`, `toggle_user:<tg>`,
//! `assignees_next`, `deadline_none`, `rem_preset:<hours>`, `rem_none`,
//! `rem_custom`, `reg_team:<team>`, `task_action:<action>:<task_id>`.

use taskwire_core::error::Result;
use taskwire_core::types::{Button, CallbackPress, Keyboard};
use taskwire_store::{Actor, Role, SessionState};

use crate::{finalize, format, lifecycle, wizard, Engine};

pub(crate) async fn handle(engine: &Engine, cb: CallbackPress) -> Result<()> {
    let role = if engine.is_boss(cb.actor_id) {
        Role::Boss
    } else {
        Role::Worker
    };
    let actor = engine
        .store()
        .upsert_actor(cb.actor_id, cb.username.as_deref(), role)?;

    let data = cb.payload.clone();
    if let Some(team) = data.strip_prefix("pick_team:") {
        on_pick_team(engine, &cb, team).await
    } else if data == "pick_people" {
        on_pick_people(engine, &cb).await
    } else if data == "assignees_menu" {
        send_assignee_menu(engine, cb.chat_id).await?;
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "Assignee menu")
            .await
            .log("ack");
        Ok(())
    } else if let Some(raw) = data.strip_prefix("toggle_user:") {
        on_toggle_user(engine, &cb, raw).await
    } else if data == "assignees_next" {
        on_assignees_next(engine, &cb).await
    } else if data == "deadline_none" {
        on_deadline_none(engine, &actor, &cb).await
    } else if let Some(raw) = data.strip_prefix("rem_preset:") {
        on_reminder_choice(engine, &actor, &cb, raw, "Preset applied").await
    } else if data == "rem_none" {
        on_reminder_choice(engine, &actor, &cb, "", "No reminders").await
    } else if data == "rem_custom" {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "Enter hours manually")
            .await
            .log("ack");
        engine
            .reply(
                cb.chat_id,
                "Type HOURS before the deadline, comma-separated (e.g. 48,24,6).",
            )
            .await;
        Ok(())
    } else if let Some(team) = data.strip_prefix("reg_team:") {
        on_reg_team_pick(engine, &cb, team).await
    } else if let Some(rest) = data.strip_prefix("task_action:") {
        lifecycle::on_task_action(engine, &actor, &cb, rest).await
    } else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "")
            .await
            .log("ack unknown payload");
        Ok(())
    }
}

/// Top-level assignee picker: one button per team, plus individuals and Next.
pub(crate) async fn send_assignee_menu(engine: &Engine, chat_id: i64) -> Result<()> {
    let teams = engine.store().list_teams()?;
    let mut kb = Keyboard::default();
    for team in &teams {
        kb = kb.row(vec![Button::new(
            format!("Team: {team}"),
            format!("pick_team:{team}"),
        )]);
    }
    kb = kb
        .row(vec![Button::new("Pick individuals", "pick_people")])
        .row(vec![Button::new("Next ▶", "assignees_next")]);
    engine
        .reply_kb(
            chat_id,
            "Pick assignees: whole teams or individual people. \
             Press Next when finished.",
            kb,
        )
        .await;
    Ok(())
}

async fn on_pick_team(engine: &Engine, cb: &CallbackPress, team: &str) -> Result<()> {
    let workers = engine.store().workers_by_team(team)?;
    engine
        .gateway()
        .edit_reply_markup(cb.chat_id, cb.message_id, format::worker_toggle_keyboard(&workers))
        .await
        .log("edit picker");
    engine
        .gateway()
        .ack_callback(&cb.callback_id, &format!("Team: {team}"))
        .await
        .log("ack");
    Ok(())
}

async fn on_pick_people(engine: &Engine, cb: &CallbackPress) -> Result<()> {
    let workers = engine.store().all_workers()?;
    engine
        .gateway()
        .edit_reply_markup(cb.chat_id, cb.message_id, format::worker_toggle_keyboard(&workers))
        .await
        .log("edit picker");
    engine
        .gateway()
        .ack_callback(&cb.callback_id, "All workers")
        .await
        .log("ack");
    Ok(())
}

async fn on_toggle_user(engine: &Engine, cb: &CallbackPress, raw: &str) -> Result<()> {
    let Ok(tg_id) = raw.parse::<i64>() else {
        return Ok(());
    };
    let Some(SessionState::TaskAssignees { mut draft }) =
        engine.store().load_session(cb.actor_id)?
    else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "No active task draft")
            .await
            .log("ack");
        return Ok(());
    };
    draft.toggle_assignee(tg_id);
    let count = draft.assignee_tg_ids.len();
    engine
        .store()
        .save_session(cb.actor_id, &SessionState::TaskAssignees { draft })?;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, &format!("Selected: {count}"))
        .await
        .log("ack");
    Ok(())
}

async fn on_assignees_next(engine: &Engine, cb: &CallbackPress) -> Result<()> {
    let Some(SessionState::TaskAssignees { draft }) = engine.store().load_session(cb.actor_id)?
    else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "No active task draft")
            .await
            .log("ack");
        return Ok(());
    };
    engine
        .store()
        .save_session(cb.actor_id, &SessionState::TaskDeadline { draft })?;
    engine
        .reply_kb(
            cb.chat_id,
            &format!(
                "Enter the deadline as DD.MM.YYYY HH:MM (UTC{}).\nExample: 28.08.2025 14:30",
                format::offset_suffix(engine.tz())
            ),
            Keyboard::default().row(vec![Button::new("No deadline", "deadline_none")]),
        )
        .await;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, "Deadline")
        .await
        .log("ack");
    Ok(())
}

async fn on_deadline_none(engine: &Engine, actor: &Actor, cb: &CallbackPress) -> Result<()> {
    let Some(SessionState::TaskDeadline { mut draft }) =
        engine.store().load_session(cb.actor_id)?
    else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "No active task draft")
            .await
            .log("ack");
        return Ok(());
    };
    draft.due_at = None;
    draft.remind_hours.clear();
    finalize::create_from_draft(engine, cb.chat_id, actor, &draft).await?;
    engine.store().clear_session(cb.actor_id)?;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, "No deadline")
        .await
        .log("ack");
    Ok(())
}

async fn on_reminder_choice(
    engine: &Engine,
    actor: &Actor,
    cb: &CallbackPress,
    raw_hours: &str,
    ack: &str,
) -> Result<()> {
    let Some(SessionState::TaskReminders { mut draft }) =
        engine.store().load_session(cb.actor_id)?
    else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "No active task draft")
            .await
            .log("ack");
        return Ok(());
    };
    draft.remind_hours = wizard::parse_reminder_hours(raw_hours).unwrap_or_default();
    finalize::create_from_draft(engine, cb.chat_id, actor, &draft).await?;
    engine.store().clear_session(cb.actor_id)?;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, ack)
        .await
        .log("ack");
    Ok(())
}

async fn on_reg_team_pick(engine: &Engine, cb: &CallbackPress, team: &str) -> Result<()> {
    let Some(SessionState::RegTeam { name }) = engine.store().load_session(cb.actor_id)? else {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "No registration in progress")
            .await
            .log("ack");
        return Ok(());
    };
    wizard::finish_registration(engine, cb.actor_id, cb.chat_id, &name, team).await?;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, &format!("Team: {team}"))
        .await
        .log("ack");
    Ok(())
}
