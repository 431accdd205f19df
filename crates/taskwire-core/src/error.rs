//! Taskwire error type shared by all crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskwireError>;

#[derive(Error, Debug)]
pub enum TaskwireError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
