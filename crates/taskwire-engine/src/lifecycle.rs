//! Per-(task, assignee) status transitions driven by `task_action:` buttons,
//! and the read-only overdue predicate.

use chrono::{DateTime, Utc};
use taskwire_core::error::Result;
use taskwire_core::types::CallbackPress;
use taskwire_store::{Actor, AssignStatus, SessionState};

use crate::Engine;

/// An assignment is overdue when its deadline passed, it is not done, and
/// nothing has been submitted for it. Not a stored state.
pub fn is_overdue(
    due_at: Option<DateTime<Utc>>,
    status: AssignStatus,
    has_result: bool,
    now: DateTime<Utc>,
) -> bool {
    matches!(due_at, Some(due) if due < now) && status != AssignStatus::Done && !has_result
}

pub(crate) async fn on_task_action(
    engine: &Engine,
    actor: &Actor,
    cb: &CallbackPress,
    rest: &str,
) -> Result<()> {
    let Some((action, raw_id)) = rest.split_once(':') else {
        return Ok(());
    };
    let Ok(task_id) = raw_id.parse::<i64>() else {
        return Ok(());
    };

    match action {
        "accept" => on_accept(engine, actor, cb, task_id).await,
        "done" => on_done(engine, actor, cb, task_id).await,
        "fail" => on_fail(engine, actor, cb, task_id).await,
        "upload" => on_upload(engine, cb, task_id).await,
        _ => Ok(()),
    }
}

async fn on_accept(engine: &Engine, actor: &Actor, cb: &CallbackPress, task_id: i64) -> Result<()> {
    let ack = if engine.store().set_in_progress(task_id, actor.id)? {
        "Status: in progress"
    } else {
        "Assignment not found"
    };
    engine
        .gateway()
        .ack_callback(&cb.callback_id, ack)
        .await
        .log("ack accept");
    Ok(())
}

async fn on_done(engine: &Engine, actor: &Actor, cb: &CallbackPress, task_id: i64) -> Result<()> {
    // Precondition: at least one submitted result for this pair.
    if !engine.store().has_result(task_id, actor.id)? {
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "Send a result first")
            .await
            .log("ack done-guard");
        return Ok(());
    }

    let changed = engine.store().mark_done(task_id, actor.id)?;
    if !changed {
        // Concurrent or repeated press: the row was already done.
        engine
            .gateway()
            .ack_callback(&cb.callback_id, "Already marked as done")
            .await
            .log("ack done-noop");
        return Ok(());
    }

    engine
        .gateway()
        .ack_callback(&cb.callback_id, "Marked as done")
        .await
        .log("ack done");

    // The pair is finished; its pending reminders are pointless now.
    if let Err(e) = engine.store().mark_pair_reminders_sent(task_id, actor.id) {
        tracing::warn!("silence reminders for task {task_id}: {e}");
    }

    if let Some(task) = engine.store().get_task(task_id)? {
        if let Some(creator) = engine.store().actor_by_id(task.creator_id)? {
            let who = actor.username.as_deref().unwrap_or("user");
            engine
                .reply(
                    creator.tg_id,
                    &format!("✔️ @{who} finished task #{task_id}"),
                )
                .await;
        }
    }
    Ok(())
}

async fn on_fail(engine: &Engine, actor: &Actor, cb: &CallbackPress, task_id: i64) -> Result<()> {
    let ack = if engine.store().mark_failed(task_id, actor.id)? {
        "Marked: not done"
    } else {
        "The assignment is already closed"
    };
    engine
        .gateway()
        .ack_callback(&cb.callback_id, ack)
        .await
        .log("ack fail");
    Ok(())
}

async fn on_upload(engine: &Engine, cb: &CallbackPress, task_id: i64) -> Result<()> {
    engine
        .store()
        .save_session(cb.actor_id, &SessionState::AwaitResult { task_id })?;
    engine
        .gateway()
        .ack_callback(&cb.callback_id, "Send the result as a message or file")
        .await
        .log("ack upload");
    engine
        .reply(cb.chat_id, "Send the result (text, file or voice).")
        .await;
    Ok(())
}
