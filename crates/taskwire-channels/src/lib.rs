//! # Taskwire Channels
//! Chat transport implementations. Telegram is the only one wired in.

pub mod telegram;

pub use telegram::{TelegramGateway, TelegramPoller, UpdateStream};
