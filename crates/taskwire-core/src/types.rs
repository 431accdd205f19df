//! Inbound events and outbound effect types shared across crates.

use serde::{Deserialize, Serialize};

/// One inbound event from the chat gateway.
#[derive(Debug, Clone)]
pub enum Update {
    Message(Message),
    Callback(CallbackPress),
}

/// A text/command/attachment message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Platform id of the sender.
    pub actor_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub text: String,
    pub command: Option<Command>,
    pub file: Option<FileRef>,
}

/// A parsed `/command` with its trailing arguments.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub args: String,
}

/// An inline-button press.
#[derive(Debug, Clone)]
pub struct CallbackPress {
    pub actor_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub username: Option<String>,
    /// Opaque payload attached to the pressed button.
    pub payload: String,
    /// Gateway-side id used to acknowledge the press.
    pub callback_id: String,
}

/// Reference to a file held by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub kind: FileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Document,
    Voice,
    Audio,
    Photo,
    Video,
}

/// Inline keyboard attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Outcome of a fire-and-forget outbound call.
///
/// Consumed only for logging, never for control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "delivery outcomes should at least be logged"]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    /// Log a failed delivery and drop the outcome.
    pub fn log(self, context: &str) {
        if let Delivery::Failed(reason) = self {
            tracing::warn!("Send failed ({context}): {reason}");
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}
