//! User-visible strings: task cards, list lines, status labels, keyboards.

use chrono::{DateTime, FixedOffset, Utc};
use taskwire_core::types::{Button, Keyboard};
use taskwire_store::{Actor, AssignStatus, AssigneeView, NewTask, Task};

pub fn status_label(status: AssignStatus) -> &'static str {
    match status {
        AssignStatus::New => "🆕 new",
        AssignStatus::InProgress => "🚀 in progress",
        AssignStatus::Done => "✔️ done",
        AssignStatus::Failed => "⛔ not done",
    }
}

pub fn format_due(due: DateTime<Utc>, tz: FixedOffset) -> String {
    due.with_timezone(&tz).format("%d.%m.%Y %H:%M").to_string()
}

/// "+03:00"-style suffix for prompts that mention the configured zone.
pub fn offset_suffix(tz: FixedOffset) -> String {
    tz.to_string()
}

pub fn task_line(task: &Task, tz: FixedOffset, overdue: bool) -> String {
    let mut line = format!("• #{} {}", task.id, task.title.as_deref().unwrap_or("(untitled)"));
    if let Some(due) = task.due_at {
        line.push_str(&format!(" — due {}", format_due(due, tz)));
    }
    if overdue {
        line.push_str(" ⛔ OVERDUE");
    }
    line
}

pub fn task_list(tasks: &[Task], tz: FixedOffset) -> String {
    tasks
        .iter()
        .map(|t| task_line(t, tz, false))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn done_line(task: &Task, completed_at: DateTime<Utc>, tz: FixedOffset) -> String {
    format!(
        "• #{} {} — completed {}",
        task.id,
        task.title.as_deref().unwrap_or("(untitled)"),
        format_due(completed_at, tz)
    )
}

pub fn assignee_line(view: &AssigneeView) -> String {
    match view.tg_id {
        Some(_) => format!(
            "  - {} @{} [{}]: {}",
            view.name.as_deref().unwrap_or(""),
            view.username.as_deref().unwrap_or(""),
            view.team.as_deref().unwrap_or(""),
            status_label(view.status)
        ),
        None => format!("  - (unassigned): {}", status_label(view.status)),
    }
}

/// The notification card sent to each assignee on task creation.
pub fn task_card(task_id: i64, task: &NewTask, tz: FixedOffset) -> String {
    let mut text = format!("New task #{task_id}\n");
    if let Some(title) = &task.title {
        text.push_str(&format!("\n{title}\n"));
    }
    if let Some(description) = &task.description {
        text.push_str(&format!("\n{description}\n"));
    }
    if let Some(due) = task.due_at {
        text.push_str(&format!("\nDeadline: {}\n", format_due(due, tz)));
    }
    text
}

pub fn reminder_preset_keyboard() -> Keyboard {
    Keyboard::default()
        .row(vec![
            Button::new("48,24,6 h", "rem_preset:48,24,6"),
            Button::new("24,12,1 h", "rem_preset:24,12,1"),
        ])
        .row(vec![
            Button::new("6,3,1 h", "rem_preset:6,3,1"),
            Button::new("No reminders", "rem_none"),
        ])
        .row(vec![Button::new("Enter manually", "rem_custom")])
}

/// Toggle list used by the assignee picker. Pressing a worker toggles them
/// in and out of the draft's candidate set.
pub fn worker_toggle_keyboard(workers: &[Actor]) -> Keyboard {
    let mut kb = Keyboard::default();
    for w in workers {
        let label = format!(
            "{} [{}]",
            w.name.as_deref().unwrap_or(""),
            w.team.as_deref().unwrap_or("")
        );
        kb = kb.row(vec![Button::new(label, format!("toggle_user:{}", w.tg_id))]);
    }
    kb.row(vec![Button::new("⬅ Back", "assignees_menu")])
}
