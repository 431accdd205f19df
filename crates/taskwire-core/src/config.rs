//! Taskwire configuration system.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskwireError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskwireConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Telegram ids with the `boss` role. Fixed at startup, never mutated.
    #[serde(default)]
    pub boss_ids: Vec<i64>,
    /// Offset from UTC, in minutes, used when parsing user-entered deadlines.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Chat that receives `/report` escalations. Falls back to the first boss.
    #[serde(default)]
    pub escalation_chat_id: Option<i64>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_db_path() -> String {
    TaskwireConfig::home_dir()
        .join("taskwire.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for TaskwireConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            db_path: default_db_path(),
            boss_ids: Vec::new(),
            utc_offset_minutes: 0,
            escalation_chat_id: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl TaskwireConfig {
    /// Load config from the default path (~/.taskwire/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskwireError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TaskwireError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TaskwireError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Taskwire home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskwire")
    }

    /// The fixed boss set, as a read-only membership structure.
    pub fn boss_set(&self) -> BTreeSet<i64> {
        self.boss_ids.iter().copied().collect()
    }

    /// The configured deadline time zone. Offsets outside ±24h fall back to UTC.
    pub fn tz(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    1
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Reminder scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// How long after the deadline the overdue check fires.
    #[serde(default = "default_grace_minutes")]
    pub overdue_grace_minutes: i64,
}

fn default_tick_secs() -> u64 {
    30
}

fn default_grace_minutes() -> i64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            overdue_grace_minutes: default_grace_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TaskwireConfig::default();
        assert!(config.boss_ids.is_empty());
        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.scheduler.overdue_grace_minutes, 30);
        assert_eq!(config.telegram.poll_interval_secs, 1);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            boss_ids = [100, 200]
            utc_offset_minutes = 180

            [telegram]
            bot_token = "123:abc"

            [scheduler]
            tick_secs = 5
        "#;

        let config: TaskwireConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.boss_ids, vec![100, 200]);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.scheduler.tick_secs, 5);
        assert_eq!(config.scheduler.overdue_grace_minutes, 30);
        assert_eq!(config.tz().local_minus_utc(), 180 * 60);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: TaskwireConfig = toml::from_str("").unwrap();
        assert!(config.telegram.bot_token.is_empty());
        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.tz().local_minus_utc(), 0);
    }

    #[test]
    fn test_boss_set_membership() {
        let config: TaskwireConfig = toml::from_str("boss_ids = [7, 7, 9]").unwrap();
        let bosses = config.boss_set();
        assert!(bosses.contains(&7));
        assert!(bosses.contains(&9));
        assert!(!bosses.contains(&8));
        assert_eq!(bosses.len(), 2);
    }
}
