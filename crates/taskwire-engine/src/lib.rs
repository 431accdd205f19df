//! # Taskwire Engine
//! Turns disconnected inbound chat events into ordered multi-step flows:
//! the task-creation wizard, registration, result submission and the
//! per-assignee task lifecycle. One call per inbound event; the session
//! row in the store carries all flow state between events.

pub mod callbacks;
pub mod commands;
pub mod finalize;
pub mod format;
pub mod lifecycle;
pub mod wizard;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::FixedOffset;
use taskwire_core::config::TaskwireConfig;
use taskwire_core::error::Result;
use taskwire_core::types::{Keyboard, Message, Update};
use taskwire_core::Gateway;
use taskwire_store::{Role, Store};

pub struct Engine {
    store: Arc<Store>,
    gateway: Arc<dyn Gateway>,
    bosses: BTreeSet<i64>,
    tz: FixedOffset,
    grace: chrono::Duration,
    escalation_chat: Option<i64>,
}

impl Engine {
    pub fn new(config: &TaskwireConfig, store: Arc<Store>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            store,
            gateway,
            bosses: config.boss_set(),
            tz: config.tz(),
            grace: chrono::Duration::minutes(config.scheduler.overdue_grace_minutes),
            escalation_chat: config.escalation_chat_id,
        }
    }

    pub fn is_boss(&self, tg_id: i64) -> bool {
        self.bosses.contains(&tg_id)
    }

    /// Entry point for one inbound event. Errors are logged, never fatal.
    pub async fn handle_update(&self, update: Update) {
        let outcome = match update {
            Update::Message(msg) => self.handle_message(msg).await,
            Update::Callback(cb) => callbacks::handle(self, cb).await,
        };
        if let Err(e) = outcome {
            tracing::error!("Update handling failed: {e}");
        }
    }

    async fn handle_message(&self, msg: Message) -> Result<()> {
        let role = if self.is_boss(msg.actor_id) {
            Role::Boss
        } else {
            Role::Worker
        };
        let actor = self
            .store
            .upsert_actor(msg.actor_id, msg.username.as_deref(), role)?;

        if let Some(cmd) = msg.command.clone() {
            return commands::handle(self, &actor, &msg, &cmd).await;
        }
        wizard::handle_text(self, &actor, &msg).await
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn gateway(&self) -> &dyn Gateway {
        &*self.gateway
    }

    pub(crate) fn tz(&self) -> FixedOffset {
        self.tz
    }

    pub(crate) fn grace(&self) -> chrono::Duration {
        self.grace
    }

    /// Where `/report` escalations go: the configured chat, else the first
    /// boss in the fixed set.
    pub(crate) fn escalation_target(&self) -> Option<i64> {
        self.escalation_chat
            .or_else(|| self.bosses.iter().next().copied())
    }

    pub(crate) async fn reply(&self, chat_id: i64, text: &str) {
        self.gateway
            .send_message(chat_id, text, None)
            .await
            .log("reply");
    }

    pub(crate) async fn reply_kb(&self, chat_id: i64, text: &str, keyboard: Keyboard) {
        self.gateway
            .send_message(chat_id, text, Some(keyboard))
            .await
            .log("reply with keyboard");
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use taskwire_core::types::{Delivery, FileRef, Keyboard};
    use taskwire_core::Gateway;

    /// Records every outbound effect; optionally fails all sends.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<(i64, String, Option<Keyboard>)>>,
        pub files: Mutex<Vec<(i64, FileRef)>>,
        pub acks: Mutex<Vec<String>>,
        pub fail_all: bool,
    }

    impl RecordingGateway {
        pub fn texts_for(&self, chat_id: i64) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _, _)| *c == chat_id)
                .map(|(_, t, _)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            keyboard: Option<Keyboard>,
        ) -> Delivery {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id, text.to_string(), keyboard));
            if self.fail_all {
                Delivery::Failed("recording gateway set to fail".into())
            } else {
                Delivery::Delivered
            }
        }

        async fn send_file(&self, chat_id: i64, file: &FileRef) -> Delivery {
            self.files.lock().unwrap().push((chat_id, file.clone()));
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

        async fn ack_callback(&self, _callback_id: &str, text: &str) -> Delivery {
            self.acks.lock().unwrap().push(text.to_string());
            Delivery::Delivered
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use taskwire_core::config::TaskwireConfig;
    use taskwire_core::types::{CallbackPress, Command, Message, Update};
    use taskwire_store::{AssignStatus, ReminderKind, SessionState, Store};

    use super::testutil::RecordingGateway;
    use super::Engine;

    const BOSS: i64 = 1;
    const WORKER_A: i64 = 11;
    const WORKER_B: i64 = 22;

    fn engine() -> (Engine, Arc<Store>, Arc<RecordingGateway>) {
        let mut config = TaskwireConfig::default();
        config.boss_ids = vec![BOSS];
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Arc::new(RecordingGateway::default());
        let engine = Engine::new(&config, store.clone(), gateway.clone());
        (engine, store, gateway)
    }

    fn text_msg(actor: i64, text: &str) -> Update {
        Update::Message(Message {
            actor_id: actor,
            chat_id: actor,
            username: Some(format!("user{actor}")),
            text: text.to_string(),
            command: None,
            file: None,
        })
    }

    fn cmd_msg(actor: i64, name: &str, args: &str) -> Update {
        Update::Message(Message {
            actor_id: actor,
            chat_id: actor,
            username: Some(format!("user{actor}")),
            text: format!("/{name} {args}").trim().to_string(),
            command: Some(Command {
                name: name.to_string(),
                args: args.to_string(),
            }),
            file: None,
        })
    }

    fn press(actor: i64, payload: &str) -> Update {
        Update::Callback(CallbackPress {
            actor_id: actor,
            chat_id: actor,
            message_id: 500,
            username: Some(format!("user{actor}")),
            payload: payload.to_string(),
            callback_id: "cb".to_string(),
        })
    }

    async fn register_workers(engine: &Engine) {
        for id in [WORKER_A, WORKER_B] {
            engine.handle_update(cmd_msg(id, "register", "")).await;
            engine.handle_update(text_msg(id, &format!("Worker {id}"))).await;
            engine.handle_update(text_msg(id, "ops")).await;
        }
    }

    #[tokio::test]
    async fn test_non_boss_newtask_is_rejected_without_session() {
        let (engine, store, gateway) = engine();
        engine.handle_update(cmd_msg(WORKER_A, "newtask", "")).await;

        assert!(store.load_session(WORKER_A).unwrap().is_none());
        let texts = gateway.texts_for(WORKER_A);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("bosses"));
    }

    #[tokio::test]
    async fn test_forbidden_command_leaves_existing_session_untouched() {
        let (engine, store, _gateway) = engine();
        engine.handle_update(cmd_msg(WORKER_A, "register", "")).await;
        assert_eq!(
            store.load_session(WORKER_A).unwrap(),
            Some(SessionState::RegName)
        );

        engine.handle_update(cmd_msg(WORKER_A, "allactive", "")).await;
        assert_eq!(
            store.load_session(WORKER_A).unwrap(),
            Some(SessionState::RegName)
        );
    }

    #[tokio::test]
    async fn test_full_wizard_roundtrip() {
        let (engine, store, gateway) = engine();
        register_workers(&engine).await;

        let due = Utc::now() + Duration::hours(72);
        let due_text = due
            .with_timezone(&engine.tz())
            .format("%d.%m.%Y %H:%M")
            .to_string();

        engine.handle_update(cmd_msg(BOSS, "newtask", "")).await;
        engine.handle_update(text_msg(BOSS, "Ship report")).await;
        engine.handle_update(text_msg(BOSS, "See attached")).await;
        engine.handle_update(press(BOSS, &format!("toggle_user:{WORKER_A}"))).await;
        engine.handle_update(press(BOSS, &format!("toggle_user:{WORKER_B}"))).await;
        engine.handle_update(press(BOSS, "assignees_next")).await;
        engine.handle_update(text_msg(BOSS, &due_text)).await;
        engine.handle_update(text_msg(BOSS, "24,2")).await;

        // Exactly one task, two assignments at `new`.
        let tasks = store.active_tasks_all().unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.title.as_deref(), Some("Ship report"));
        assert_eq!(task.description.as_deref(), Some("See attached"));

        let views = store.assignees_with_actors(task.id).unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.status == AssignStatus::New));

        // Reminder fire times per assignee: due-24h, due-2h, due, due+30m.
        let pending = store.pending_reminders_for_task(task.id).unwrap();
        assert_eq!(pending.len(), 8);
        let due_stored = task.due_at.unwrap();
        let mut times: Vec<_> = pending.iter().map(|r| r.at).collect();
        times.sort();
        times.dedup();
        assert_eq!(
            times,
            vec![
                due_stored - Duration::hours(24),
                due_stored - Duration::hours(2),
                due_stored,
                due_stored + Duration::minutes(30),
            ]
        );
        assert_eq!(
            pending.iter().filter(|r| r.kind == ReminderKind::Overdue).count(),
            2
        );

        // Session is gone and both assignees got a task card.
        assert!(store.load_session(BOSS).unwrap().is_none());
        assert!(!gateway.texts_for(WORKER_A).is_empty());
        assert!(!gateway.texts_for(WORKER_B).is_empty());
        assert!(gateway
            .texts_for(BOSS)
            .iter()
            .any(|t| t.contains(&format!("#{}", task.id))));
    }

    #[tokio::test]
    async fn test_wizard_abandonment_on_unrelated_command() {
        let (engine, store, gateway) = engine();
        register_workers(&engine).await;

        engine.handle_update(cmd_msg(BOSS, "newtask", "")).await;
        engine.handle_update(text_msg(BOSS, "Ship report")).await;
        engine.handle_update(text_msg(BOSS, "Body")).await;
        engine.handle_update(press(BOSS, &format!("toggle_user:{WORKER_A}"))).await;
        engine.handle_update(press(BOSS, "assignees_next")).await;
        assert!(matches!(
            store.load_session(BOSS).unwrap(),
            Some(SessionState::TaskDeadline { .. })
        ));

        // Any other command discards the wizard before running.
        engine.handle_update(cmd_msg(BOSS, "users", "")).await;
        assert!(store.load_session(BOSS).unwrap().is_none());

        // Text that would have matched the deadline pattern is now inert.
        let before = gateway.sent.lock().unwrap().len();
        engine.handle_update(text_msg(BOSS, "28.08.2025 14:30")).await;
        assert_eq!(gateway.sent.lock().unwrap().len(), before);
        assert!(store.active_tasks_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_reprompt_keeps_state() {
        let (engine, store, _gateway) = engine();
        register_workers(&engine).await;

        engine.handle_update(cmd_msg(BOSS, "newtask", "")).await;
        engine.handle_update(text_msg(BOSS, "T")).await;
        engine.handle_update(text_msg(BOSS, "B")).await;
        engine.handle_update(press(BOSS, &format!("toggle_user:{WORKER_A}"))).await;
        engine.handle_update(press(BOSS, "assignees_next")).await;

        engine.handle_update(text_msg(BOSS, "tomorrow at noon")).await;
        assert!(matches!(
            store.load_session(BOSS).unwrap(),
            Some(SessionState::TaskDeadline { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_requires_result_and_is_idempotent() {
        let (engine, store, gateway) = engine();
        register_workers(&engine).await;
        engine.handle_update(cmd_msg(BOSS, "start", "")).await;

        let worker = store.actor_by_tg(WORKER_A).unwrap().unwrap();
        let boss = store.actor_by_tg(BOSS).unwrap().unwrap();
        let task_id = store
            .create_task(&taskwire_store::NewTask {
                creator_id: boss.id,
                title: Some("T".into()),
                ..Default::default()
            })
            .unwrap();
        store.add_assignee(task_id, worker.id).unwrap();

        // Without a result the guard refuses.
        engine
            .handle_update(press(WORKER_A, &format!("task_action:done:{task_id}")))
            .await;
        assert_eq!(
            store.assignment_status(task_id, worker.id).unwrap(),
            Some(AssignStatus::New)
        );

        // Submit a result through the await-result flow.
        engine
            .handle_update(press(WORKER_A, &format!("task_action:upload:{task_id}")))
            .await;
        engine.handle_update(text_msg(WORKER_A, "report attached")).await;
        assert!(store.has_result(task_id, worker.id).unwrap());

        let creator_msgs_before = gateway.texts_for(BOSS).len();
        engine
            .handle_update(press(WORKER_A, &format!("task_action:done:{task_id}")))
            .await;
        assert_eq!(
            store.assignment_status(task_id, worker.id).unwrap(),
            Some(AssignStatus::Done)
        );
        let creator_msgs_after_first = gateway.texts_for(BOSS).len();
        assert!(creator_msgs_after_first > creator_msgs_before);

        // Second press is a no-op and does not re-notify the creator.
        engine
            .handle_update(press(WORKER_A, &format!("task_action:done:{task_id}")))
            .await;
        assert_eq!(gateway.texts_for(BOSS).len(), creator_msgs_after_first);
        assert!(gateway
            .acks
            .lock()
            .unwrap()
            .iter()
            .any(|a| a.contains("Already")));
    }

    #[tokio::test]
    async fn test_del_refuses_boss_and_removes_worker() {
        let (engine, store, gateway) = engine();
        register_workers(&engine).await;

        engine.handle_update(cmd_msg(BOSS, "del", &BOSS.to_string())).await;
        assert!(gateway
            .texts_for(BOSS)
            .iter()
            .any(|t| t.contains("boss")));

        engine
            .handle_update(cmd_msg(BOSS, "del", &WORKER_A.to_string()))
            .await;
        assert!(store.actor_by_tg(WORKER_A).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deltask_is_creator_only() {
        let (engine, store, _gateway) = engine();
        register_workers(&engine).await;
        engine.handle_update(cmd_msg(BOSS, "start", "")).await;

        let boss = store.actor_by_tg(BOSS).unwrap().unwrap();
        let task_id = store
            .create_task(&taskwire_store::NewTask {
                creator_id: boss.id,
                ..Default::default()
            })
            .unwrap();

        engine
            .handle_update(cmd_msg(WORKER_A, "deltask", &task_id.to_string()))
            .await;
        assert!(store.get_task(task_id).unwrap().is_some());

        engine
            .handle_update(cmd_msg(BOSS, "deltask", &task_id.to_string()))
            .await;
        assert!(store.get_task(task_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_report_forwards_to_escalation_target() {
        let (engine, store, gateway) = engine();
        engine.handle_update(cmd_msg(WORKER_A, "report", "")).await;
        assert_eq!(
            store.load_session(WORKER_A).unwrap(),
            Some(SessionState::ErrorReport)
        );

        engine
            .handle_update(text_msg(WORKER_A, "the task list is empty"))
            .await;
        assert!(store.load_session(WORKER_A).unwrap().is_none());
        // No escalation chat configured: falls back to the first boss.
        assert!(gateway
            .texts_for(BOSS)
            .iter()
            .any(|t| t.contains("the task list is empty")));
    }
}
