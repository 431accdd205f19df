//! Slash-command handling. Commands always take precedence over wizard
//! state: role checks run first, then any active session is discarded,
//! then the command executes.

use chrono::Utc;
use taskwire_core::error::Result;
use taskwire_core::types::{Command, Message};
use taskwire_store::{Actor, SessionState, TaskDraft};

use crate::{format, lifecycle, Engine};

const BOSS_ONLY: &[&str] = &["newtask", "allactive", "users", "del"];

pub(crate) async fn handle(
    engine: &Engine,
    actor: &Actor,
    msg: &Message,
    cmd: &Command,
) -> Result<()> {
    if BOSS_ONLY.contains(&cmd.name.as_str()) && !engine.is_boss(msg.actor_id) {
        engine
            .reply(msg.chat_id, "This command is for bosses only.")
            .await;
        return Ok(());
    }

    // Command precedence: a forbidden action never touched the session, but
    // an allowed one supersedes whatever flow was active.
    engine.store().clear_session(msg.actor_id)?;

    match cmd.name.as_str() {
        "start" => on_start(engine, msg).await,
        "register" => {
            engine
                .store()
                .save_session(msg.actor_id, &SessionState::RegName)?;
            engine
                .reply(msg.chat_id, "Enter your full name (e.g. Jane Smith):")
                .await;
            Ok(())
        }
        "newtask" => {
            engine.store().save_session(
                msg.actor_id,
                &SessionState::TaskTitle {
                    draft: TaskDraft::default(),
                },
            )?;
            engine.reply(msg.chat_id, "Enter a short task title:").await;
            Ok(())
        }
        "mytasks" => on_my_tasks(engine, actor, msg).await,
        "teamtasks" => on_team_tasks(engine, actor, msg).await,
        "done" => on_done_tasks(engine, actor, msg).await,
        "allactive" => on_all_active(engine, msg).await,
        "users" => on_users(engine, msg).await,
        "del" => on_delete_worker(engine, msg, &cmd.args).await,
        "deltask" => on_delete_task(engine, actor, msg, &cmd.args).await,
        "report" => {
            if engine.escalation_target().is_none() {
                engine
                    .reply(msg.chat_id, "No escalation recipient is configured.")
                    .await;
                return Ok(());
            }
            engine
                .store()
                .save_session(msg.actor_id, &SessionState::ErrorReport)?;
            engine
                .reply(
                    msg.chat_id,
                    "Describe the problem in one message; it will be forwarded as-is.",
                )
                .await;
            Ok(())
        }
        _ => {
            engine.reply(msg.chat_id, "Unknown command.").await;
            Ok(())
        }
    }
}

async fn on_start(engine: &Engine, msg: &Message) -> Result<()> {
    let text = if engine.is_boss(msg.actor_id) {
        "You are registered as a boss. Commands:\n\
         /newtask — create a task\n\
         /allactive — all active tasks with statuses\n\
         /users — list workers\n\
         /del <tg_id> — delete a worker\n\
         /deltask <task_id> — delete a task you created\n\
         /mytasks — tasks assigned to you\n\
         /register — fill in your profile"
    } else {
        "Hi! Register as a worker with /register.\n\
         Commands:\n\
         /mytasks — my open tasks\n\
         /teamtasks — my team's tasks\n\
         /done — my completed tasks\n\
         /report — report a problem"
    };
    engine.reply(msg.chat_id, text).await;
    Ok(())
}

async fn on_my_tasks(engine: &Engine, actor: &Actor, msg: &Message) -> Result<()> {
    let tasks = engine.store().active_tasks_for_actor(actor.id)?;
    if tasks.is_empty() {
        engine.reply(msg.chat_id, "No active tasks.").await;
        return Ok(());
    }
    let now = Utc::now();
    let mut lines = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let status = engine
            .store()
            .assignment_status(task.id, actor.id)?
            .unwrap_or(taskwire_store::AssignStatus::New);
        let has_result = engine.store().has_result(task.id, actor.id)?;
        let overdue = lifecycle::is_overdue(task.due_at, status, has_result, now);
        lines.push(format::task_line(task, engine.tz(), overdue));
    }
    engine.reply(msg.chat_id, &lines.join("\n")).await;
    Ok(())
}

async fn on_team_tasks(engine: &Engine, actor: &Actor, msg: &Message) -> Result<()> {
    let Some(team) = actor.team.as_deref().filter(|t| !t.is_empty()) else {
        engine
            .reply(msg.chat_id, "Your profile has no team. Use /register.")
            .await;
        return Ok(());
    };
    let tasks = engine.store().active_tasks_for_team(team)?;
    if tasks.is_empty() {
        engine
            .reply(msg.chat_id, "No active tasks for your team.")
            .await;
        return Ok(());
    }
    engine
        .reply(msg.chat_id, &format::task_list(&tasks, engine.tz()))
        .await;
    Ok(())
}

async fn on_done_tasks(engine: &Engine, actor: &Actor, msg: &Message) -> Result<()> {
    let done = engine.store().done_tasks_for_actor(actor.id)?;
    if done.is_empty() {
        engine.reply(msg.chat_id, "No completed tasks yet.").await;
        return Ok(());
    }
    let lines: Vec<String> = done
        .iter()
        .map(|(task, at)| format::done_line(task, *at, engine.tz()))
        .collect();
    engine.reply(msg.chat_id, &lines.join("\n")).await;
    Ok(())
}

async fn on_all_active(engine: &Engine, msg: &Message) -> Result<()> {
    let tasks = engine.store().active_tasks_all()?;
    if tasks.is_empty() {
        engine.reply(msg.chat_id, "No active tasks.").await;
        return Ok(());
    }
    let mut out = String::new();
    for task in &tasks {
        out.push_str(&format::task_line(task, engine.tz(), false));
        out.push('\n');
        for view in engine.store().assignees_with_actors(task.id)? {
            out.push_str(&format::assignee_line(&view));
            out.push('\n');
        }
        out.push('\n');
    }
    engine.reply(msg.chat_id, out.trim_end()).await;
    Ok(())
}

async fn on_users(engine: &Engine, msg: &Message) -> Result<()> {
    let workers = engine.store().all_workers()?;
    if workers.is_empty() {
        engine.reply(msg.chat_id, "No workers yet.").await;
        return Ok(());
    }
    let mut out = String::from("Workers (tg_id):\n");
    for w in &workers {
        out.push_str(&format!(
            "- {} [{}] @{} — {}\n",
            w.name.as_deref().unwrap_or(""),
            w.team.as_deref().unwrap_or(""),
            w.username.as_deref().unwrap_or(""),
            w.tg_id
        ));
    }
    out.push_str("\nDelete with: /del <tg_id>");
    engine.reply(msg.chat_id, &out).await;
    Ok(())
}

async fn on_delete_worker(engine: &Engine, msg: &Message, args: &str) -> Result<()> {
    let args = args.trim();
    if args.is_empty() {
        engine.reply(msg.chat_id, "Usage: /del <tg_id>").await;
        return Ok(());
    }
    let Ok(tg_id) = args.parse::<i64>() else {
        engine.reply(msg.chat_id, "tg_id must be a number").await;
        return Ok(());
    };
    if engine.is_boss(tg_id) {
        engine.reply(msg.chat_id, "A boss cannot be deleted.").await;
        return Ok(());
    }
    match engine.store().delete_worker(tg_id) {
        Ok(0) => {
            engine
                .reply(msg.chat_id, "Worker not found (or not a worker).")
                .await
        }
        Ok(_) => {
            engine
                .reply(
                    msg.chat_id,
                    "Deleted. Their pending reminders were removed and their \
                     assignments are now unassigned.",
                )
                .await
        }
        Err(e) => {
            tracing::error!("delete worker {tg_id}: {e}");
            engine.reply(msg.chat_id, "Failed to delete the worker.").await
        }
    }
    Ok(())
}

async fn on_delete_task(engine: &Engine, actor: &Actor, msg: &Message, args: &str) -> Result<()> {
    let Ok(task_id) = args.trim().parse::<i64>() else {
        engine.reply(msg.chat_id, "Usage: /deltask <task_id>").await;
        return Ok(());
    };
    let Some(task) = engine.store().get_task(task_id)? else {
        engine.reply(msg.chat_id, "Task not found.").await;
        return Ok(());
    };
    if task.creator_id != actor.id {
        engine
            .reply(msg.chat_id, "Only the task creator can delete it.")
            .await;
        return Ok(());
    }
    engine.store().delete_task(task_id)?;
    engine
        .reply(
            msg.chat_id,
            &format!("Task #{task_id} deleted, along with its assignments and reminders."),
        )
        .await;
    Ok(())
}
