//! # Taskwire Scheduler
//! Background loop that fires persisted reminders. Each tick pulls unsent
//! rows whose fire time has passed, earliest first, dispatches a
//! notification per row and flips the row's sent flag.
//!
//! The flag flips whether or not delivery succeeded: duplicate suppression
//! is prioritized over guaranteed delivery. "Due" is derived purely from
//! persisted timestamps, so a restart resumes cleanly mid-backlog.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use taskwire_core::error::Result;
use taskwire_core::Gateway;
use taskwire_store::{Reminder, ReminderKind, Store, Task};

pub struct ReminderScheduler {
    store: Arc<Store>,
    gateway: Arc<dyn Gateway>,
    period: std::time::Duration,
}

impl ReminderScheduler {
    pub fn new(store: Arc<Store>, gateway: Arc<dyn Gateway>, tick_secs: u64) -> Self {
        Self {
            store,
            gateway,
            period: std::time::Duration::from_secs(tick_secs.max(1)),
        }
    }

    /// Run until the token is cancelled. Tick errors are logged; the loop
    /// never dies on them.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "⏰ Reminder scheduler started (check every {}s)",
            self.period.as_secs()
        );
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reminder scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Reminder tick failed: {e}");
                    }
                }
            }
        }
    }

    /// One poll cycle. Row-level failures never stop the cycle.
    pub async fn tick(&self) -> Result<()> {
        let due = self.store.due_reminders(Utc::now())?;
        for reminder in &due {
            self.fire(reminder).await;
        }
        Ok(())
    }

    async fn fire(&self, reminder: &Reminder) {
        if let Err(e) = self.dispatch(reminder).await {
            tracing::warn!("Dispatch reminder {}: {e}", reminder.id);
        }
        // Sent flips even after a failed send; at most one attempt per row.
        if let Err(e) = self.store.mark_reminder_sent(reminder.id) {
            tracing::error!("Mark reminder {} sent: {e}", reminder.id);
        }
    }

    async fn dispatch(&self, reminder: &Reminder) -> Result<()> {
        let Some(task) = self.store.get_task(reminder.task_id)? else {
            tracing::debug!("Reminder {} references a deleted task", reminder.id);
            return Ok(());
        };

        match reminder.kind {
            ReminderKind::Before | ReminderKind::Deadline => {
                if let Some(actor_id) = reminder.actor_id {
                    self.nudge_actor(actor_id, reminder).await?;
                }
                Ok(())
            }
            ReminderKind::Overdue => self.dispatch_overdue(reminder, &task).await,
        }
    }

    async fn dispatch_overdue(&self, reminder: &Reminder, task: &Task) -> Result<()> {
        match reminder.actor_id {
            Some(actor_id) => {
                // Done or submitted: the nudge would be noise. The row is
                // still marked sent by the caller; the window has passed.
                if self.store.pair_completed(reminder.task_id, actor_id)? {
                    tracing::debug!(
                        "Overdue check for task {} suppressed: pair already handled",
                        reminder.task_id
                    );
                    return Ok(());
                }
                self.nudge_actor(actor_id, reminder).await
            }
            None => {
                // The assignee was deleted; only the creator hears about it.
                if let Some(creator) = self.store.actor_by_id(task.creator_id)? {
                    self.gateway
                        .send_message(creator.tg_id, &orphan_text(reminder.task_id), None)
                        .await
                        .log("orphan overdue notice");
                }
                Ok(())
            }
        }
    }

    async fn nudge_actor(&self, actor_id: i64, reminder: &Reminder) -> Result<()> {
        if let Some(actor) = self.store.actor_by_id(actor_id)? {
            self.gateway
                .send_message(
                    actor.tg_id,
                    &reminder_text(reminder.kind, reminder.task_id),
                    None,
                )
                .await
                .log("reminder");
        }
        Ok(())
    }
}

fn reminder_text(kind: ReminderKind, task_id: i64) -> String {
    match kind {
        ReminderKind::Before => format!("🔔 Reminder: task #{task_id} is due soon."),
        ReminderKind::Deadline => {
            format!("⏰ Task #{task_id} has reached its deadline. Update its status.")
        }
        ReminderKind::Overdue => format!("⛔ Task #{task_id} is overdue. Update its status."),
    }
}

fn orphan_text(task_id: i64) -> String {
    format!("⛔ Task #{task_id} is overdue and no longer has an assignee.")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use taskwire_core::types::{Delivery, FileRef, Keyboard};
    use taskwire_store::{NewTask, Role};

    use super::*;

    #[derive(Default)]
    struct FakeGateway {
        sent: Mutex<Vec<(i64, String)>>,
        fail_all: bool,
    }

    impl FakeGateway {
        fn texts_for(&self, chat_id: i64) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat_id)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            _keyboard: Option<Keyboard>,
        ) -> Delivery {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            if self.fail_all {
                Delivery::Failed("gateway down".into())
            } else {
                Delivery::Delivered
            }
        }

        async fn send_file(&self, _chat_id: i64, _file: &FileRef) -> Delivery {
            Delivery::Delivered
        }

        async fn edit_reply_markup(
            &self,
            _chat_id: i64,
            _message_id: i64,
            _keyboard: Keyboard,
        ) -> Delivery {
            Delivery::Delivered
        }

        async fn ack_callback(&self, _callback_id: &str, _text: &str) -> Delivery {
            Delivery::Delivered
        }
    }

    fn seed(store: &Store) -> (i64, i64, i64) {
        let boss = store.upsert_actor(1, Some("boss"), Role::Boss).unwrap();
        let worker = store.upsert_actor(2, Some("w"), Role::Worker).unwrap();
        let task_id = store
            .create_task(&NewTask {
                creator_id: boss.id,
                title: Some("T".into()),
                due_at: Some(Utc::now() - Duration::hours(1)),
                ..Default::default()
            })
            .unwrap();
        store.add_assignee(task_id, worker.id).unwrap();
        (boss.id, worker.id, task_id)
    }

    fn scheduler(store: Arc<Store>, gateway: Arc<FakeGateway>) -> ReminderScheduler {
        ReminderScheduler::new(store, gateway, 30)
    }

    #[tokio::test]
    async fn test_due_reminder_fires_once() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Before,
            )
            .unwrap();

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();
        // Worker tg_id is 2; the nudge lands in their private chat.
        assert_eq!(gateway.texts_for(2).len(), 1);
        assert!(gateway.texts_for(2)[0].contains("due soon"));

        // The sent flag suppresses redelivery on the next tick.
        sched.tick().await.unwrap();
        assert_eq!(gateway.texts_for(2).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_marks_sent() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway {
            fail_all: true,
            ..Default::default()
        });
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Deadline,
            )
            .unwrap();

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();
        assert_eq!(gateway.texts_for(2).len(), 1);

        // No retry: the row is sent even though delivery failed.
        sched.tick().await.unwrap();
        assert_eq!(gateway.texts_for(2).len(), 1);
        assert!(store.pending_reminders_for_task(task_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overdue_suppressed_for_handled_pair() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Overdue,
            )
            .unwrap();
        store.add_result(task_id, worker, Some("done"), None).unwrap();

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();

        // Nothing sent, but the row is consumed all the same.
        assert!(gateway.sent.lock().unwrap().is_empty());
        assert!(store.pending_reminders_for_task(task_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overdue_fires_for_unhandled_pair() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Overdue,
            )
            .unwrap();

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();
        assert_eq!(gateway.texts_for(2).len(), 1);
        assert!(gateway.texts_for(2)[0].contains("overdue"));
    }

    #[tokio::test]
    async fn test_orphaned_overdue_notifies_creator_only() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Overdue,
            )
            .unwrap();

        // Deleting the worker nulls the pending overdue row's actor.
        assert_eq!(store.delete_worker(2).unwrap(), 1);

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // Boss tg_id is 1.
        assert_eq!(sent[0].0, 1);
        assert!(sent[0].1.contains("no longer has an assignee"));
    }

    #[tokio::test]
    async fn test_deleted_task_rows_are_consumed_silently() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let (_, worker, task_id) = seed(&store);
        store
            .add_reminders(
                task_id,
                &[worker],
                &[Utc::now() - Duration::minutes(5)],
                ReminderKind::Before,
            )
            .unwrap();
        // Cascade removes the reminder rows with the task.
        store.delete_task(task_id).unwrap();

        let sched = scheduler(store.clone(), gateway.clone());
        sched.tick().await.unwrap();
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(FakeGateway::default());
        let sched = scheduler(store, gateway);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sched.run(cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
