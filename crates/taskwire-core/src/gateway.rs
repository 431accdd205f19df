//! The outbound gateway seam between the core and the chat transport.

use async_trait::async_trait;

use crate::types::{Delivery, FileRef, Keyboard};

/// Fire-and-forget operations against the chat platform.
///
/// Implementations report delivery as a [`Delivery`] value; callers log
/// failures and move on. Ordering is only guaranteed per caller.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Delivery;

    async fn send_file(&self, chat_id: i64, file: &FileRef) -> Delivery;

    async fn edit_reply_markup(&self, chat_id: i64, message_id: i64, keyboard: Keyboard) -> Delivery;

    async fn ack_callback(&self, callback_id: &str, text: &str) -> Delivery;
}
