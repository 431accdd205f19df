//! Task-creation finalize: draft → task row, assignment rows, reminder
//! batches and outbound notifications.
//!
//! Only the task insert can abort the operation. Everything after the task
//! row is committed is best-effort: failures are logged and the task stands.

use chrono::{DateTime, Duration, Utc};
use taskwire_core::error::Result;
use taskwire_core::types::{Button, FileKind, FileRef, Keyboard};
use taskwire_store::{Actor, NewTask, ReminderKind, TaskDraft};

use crate::{format, Engine};

/// Reminder fire times derived from a due timestamp, already filtered to
/// strictly-future entries (`at == now` is dropped, not fired immediately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderBatches {
    pub before: Vec<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub overdue: Option<DateTime<Utc>>,
}

pub fn reminder_batches(
    due: DateTime<Utc>,
    lead_hours: &[i64],
    grace: Duration,
    now: DateTime<Utc>,
) -> ReminderBatches {
    let before = lead_hours
        .iter()
        .map(|h| due - Duration::hours(*h))
        .filter(|at| *at > now)
        .collect();
    let deadline = (due > now).then_some(due);
    let overdue_at = due + grace;
    let overdue = (overdue_at > now).then_some(overdue_at);
    ReminderBatches {
        before,
        deadline,
        overdue,
    }
}

pub(crate) async fn create_from_draft(
    engine: &Engine,
    chat_id: i64,
    creator: &Actor,
    draft: &TaskDraft,
) -> Result<()> {
    // Resolve candidates; unresolvable ids are silently dropped.
    let mut assignees: Vec<Actor> = Vec::new();
    for tg_id in &draft.assignee_tg_ids {
        match engine.store().actor_by_tg(*tg_id) {
            Ok(Some(actor)) => assignees.push(actor),
            Ok(None) => tracing::debug!("dropping unknown assignee {tg_id}"),
            Err(e) => tracing::warn!("resolve assignee {tg_id}: {e}"),
        }
    }

    let new_task = NewTask {
        creator_id: creator.id,
        title: Some(draft.title.clone()).filter(|t| !t.is_empty()),
        description: Some(draft.description.clone()).filter(|d| !d.is_empty()),
        voice_file_id: draft.voice_file_id.clone(),
        due_at: draft.due_at,
    };

    let task_id = match engine.store().create_task(&new_task) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("create task: {e}");
            engine.reply(chat_id, "Failed to create the task.").await;
            return Ok(());
        }
    };

    for actor in &assignees {
        if let Err(e) = engine.store().add_assignee(task_id, actor.id) {
            tracing::warn!("assign task {task_id} to actor {}: {e}", actor.id);
        }
    }

    if let Some(due) = draft.due_at {
        let actor_ids: Vec<i64> = assignees.iter().map(|a| a.id).collect();
        let batches = reminder_batches(due, &draft.remind_hours, engine.grace(), Utc::now());
        persist_batch(engine, task_id, &actor_ids, &batches.before, ReminderKind::Before);
        if let Some(at) = batches.deadline {
            persist_batch(engine, task_id, &actor_ids, &[at], ReminderKind::Deadline);
        }
        if let Some(at) = batches.overdue {
            persist_batch(engine, task_id, &actor_ids, &[at], ReminderKind::Overdue);
        }
    }

    let card = format::task_card(task_id, &new_task, engine.tz());
    let keyboard = task_card_keyboard(task_id);
    for actor in &assignees {
        engine
            .gateway()
            .send_message(actor.tg_id, &card, Some(keyboard.clone()))
            .await
            .log("send task card");
        if let Some(voice) = &new_task.voice_file_id {
            engine
                .gateway()
                .send_file(
                    actor.tg_id,
                    &FileRef {
                        file_id: voice.clone(),
                        kind: FileKind::Voice,
                    },
                )
                .await
                .log("send task voice");
        }
    }

    engine
        .reply(
            chat_id,
            &format!(
                "Task #{task_id} created and sent to {} assignee(s).",
                assignees.len()
            ),
        )
        .await;
    Ok(())
}

fn persist_batch(
    engine: &Engine,
    task_id: i64,
    actor_ids: &[i64],
    times: &[DateTime<Utc>],
    kind: ReminderKind,
) {
    if times.is_empty() || actor_ids.is_empty() {
        return;
    }
    if let Err(e) = engine.store().add_reminders(task_id, actor_ids, times, kind) {
        tracing::warn!("create {} reminders for task {task_id}: {e}", kind.as_str());
    }
}

fn task_card_keyboard(task_id: i64) -> Keyboard {
    Keyboard::default()
        .row(vec![Button::new(
            "🚀 Accept",
            format!("task_action:accept:{task_id}"),
        )])
        .row(vec![
            Button::new("⛔ Not done", format!("task_action:fail:{task_id}")),
            Button::new("📎 Send result", format!("task_action:upload:{task_id}")),
        ])
}
