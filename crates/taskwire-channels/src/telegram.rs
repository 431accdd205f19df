//! Telegram Bot channel — long polling + message sending via Bot API.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};

use taskwire_core::error::{Result, TaskwireError};
use taskwire_core::types::{
    CallbackPress, Command, Delivery, FileKind, FileRef, Keyboard, Message, Update,
};
use taskwire_core::Gateway;

/// Outbound half of the Telegram channel: stateless, cheap to clone.
#[derive(Clone)]
pub struct TelegramGateway {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Get bot info; used at startup to verify the token.
    pub async fn get_me(&self) -> Result<TgUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| TaskwireError::Channel(format!("getMe failed: {e}")))?;
        let body: TgApiResponse<TgUser> = response
            .json()
            .await
            .map_err(|e| TaskwireError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| TaskwireError::Channel("No bot info".into()))
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskwireError::Channel(format!("{method} failed: {e}")))?;

        let result: TgApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| TaskwireError::Channel(format!("Invalid {method} response: {e}")))?;

        if !result.ok {
            return Err(TaskwireError::Channel(format!(
                "{method} error: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn try_send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = keyboard_json(kb);
        }
        self.call("sendMessage", body).await
    }

    async fn try_send_file(&self, chat_id: i64, file: &FileRef) -> Result<()> {
        let (method, field) = match file.kind {
            FileKind::Document => ("sendDocument", "document"),
            FileKind::Voice => ("sendVoice", "voice"),
            FileKind::Audio => ("sendAudio", "audio"),
            FileKind::Photo => ("sendPhoto", "photo"),
            FileKind::Video => ("sendVideo", "video"),
        };
        let body = serde_json::json!({
            "chat_id": chat_id,
            field: file.file_id,
        });
        self.call(method, body).await
    }

    async fn try_edit_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: &Keyboard,
    ) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": keyboard_json(keyboard),
        });
        self.call("editMessageReplyMarkup", body).await
    }

    async fn try_ack_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if !text.is_empty() {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", body).await
    }
}

fn into_delivery(result: Result<()>) -> Delivery {
    match result {
        Ok(()) => Delivery::Delivered,
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_message(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Delivery {
        into_delivery(self.try_send_message(chat_id, text, keyboard.as_ref()).await)
    }

    async fn send_file(&self, chat_id: i64, file: &FileRef) -> Delivery {
        into_delivery(self.try_send_file(chat_id, file).await)
    }

    async fn edit_reply_markup(&self, chat_id: i64, message_id: i64, keyboard: Keyboard) -> Delivery {
        into_delivery(self.try_edit_reply_markup(chat_id, message_id, &keyboard).await)
    }

    async fn ack_callback(&self, callback_id: &str, text: &str) -> Delivery {
        into_delivery(self.try_ack_callback(callback_id, text).await)
    }
}

/// Inbound half: owns the long-polling cursor.
pub struct TelegramPoller {
    gateway: TelegramGateway,
    poll_interval_secs: u64,
    last_update_id: i64,
}

impl TelegramPoller {
    pub fn new(gateway: TelegramGateway, poll_interval_secs: u64) -> Self {
        Self {
            gateway,
            poll_interval_secs,
            last_update_id: 0,
        }
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TgUpdate>> {
        let response = self
            .gateway
            .client
            .get(self.gateway.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", "30".into()),
                (
                    "allowed_updates",
                    "[\"message\",\"callback_query\"]".into(),
                ),
            ])
            .send()
            .await
            .map_err(|e| TaskwireError::Channel(format!("getUpdates failed: {e}")))?;

        let body: TgApiResponse<Vec<TgUpdate>> = response
            .json()
            .await
            .map_err(|e| TaskwireError::Channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(TaskwireError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Start the polling loop — returns a stream of core [`Update`]s.
    pub fn start_polling(self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut poller = self;
            tracing::info!("Telegram polling loop started");

            loop {
                match poller.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(event) = update.to_update() {
                                if tx.send(event).is_err() {
                                    tracing::info!(
                                        "Telegram polling stopped (receiver dropped)"
                                    );
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(poller.poll_interval_secs))
                    .await;
            }
        });

        UpdateStream { rx }
    }
}

/// Stream of inbound events from polling.
pub struct UpdateStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<Update>,
}

impl Stream for UpdateStream {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for UpdateStream {}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TgApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: TgChat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<TgFile>,
    pub audio: Option<TgFile>,
    pub voice: Option<TgFile>,
    pub video: Option<TgFile>,
    pub photo: Option<Vec<TgFile>>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgFile {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgMessage>,
    pub data: Option<String>,
}

impl TgUpdate {
    /// Convert to a core inbound event. Bot senders and empty updates map
    /// to `None`.
    pub fn to_update(&self) -> Option<Update> {
        if let Some(cq) = &self.callback_query {
            let msg = cq.message.as_ref()?;
            return Some(Update::Callback(CallbackPress {
                actor_id: cq.from.id,
                chat_id: msg.chat.id,
                message_id: msg.message_id,
                username: cq.from.username.clone(),
                payload: cq.data.clone().unwrap_or_default(),
                callback_id: cq.id.clone(),
            }));
        }

        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }

        let text = msg
            .text
            .clone()
            .or_else(|| msg.caption.clone())
            .unwrap_or_default();
        let file = msg.file_ref();
        if text.is_empty() && file.is_none() {
            return None;
        }

        Some(Update::Message(Message {
            actor_id: from.id,
            chat_id: msg.chat.id,
            username: from.username.clone(),
            command: parse_command(&text),
            text,
            file,
        }))
    }
}

impl TgMessage {
    /// Any attachment collapses into one file reference; the largest photo
    /// size wins.
    fn file_ref(&self) -> Option<FileRef> {
        if let Some(d) = &self.document {
            return Some(FileRef {
                file_id: d.file_id.clone(),
                kind: FileKind::Document,
            });
        }
        if let Some(v) = &self.voice {
            return Some(FileRef {
                file_id: v.file_id.clone(),
                kind: FileKind::Voice,
            });
        }
        if let Some(a) = &self.audio {
            return Some(FileRef {
                file_id: a.file_id.clone(),
                kind: FileKind::Audio,
            });
        }
        if let Some(sizes) = &self.photo {
            if let Some(largest) = sizes.last() {
                return Some(FileRef {
                    file_id: largest.file_id.clone(),
                    kind: FileKind::Photo,
                });
            }
        }
        if let Some(v) = &self.video {
            return Some(FileRef {
                file_id: v.file_id.clone(),
                kind: FileKind::Video,
            });
        }
        None
    }
}

/// Parse a leading `/command arg...` (with an optional `@botname` suffix).
fn parse_command(text: &str) -> Option<Command> {
    let rest = text.trim().strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name_raw = parts.next().unwrap_or_default();
    let name = name_raw.split('@').next().unwrap_or_default();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(Command {
        name: name.to_string(),
        args: parts.next().unwrap_or_default().trim().to_string(),
    })
}

fn keyboard_json(kb: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = kb
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.payload }))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}
