//! # Taskwire Core
//! Shared configuration, error type, event/effect types and the gateway seam.

pub mod config;
pub mod error;
pub mod gateway;
pub mod types;

pub use config::TaskwireConfig;
pub use error::{Result, TaskwireError};
pub use gateway::Gateway;
pub use types::{Button, CallbackPress, Command, Delivery, FileKind, FileRef, Keyboard, Message, Update};
