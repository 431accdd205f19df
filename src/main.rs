//! # Taskwire — small-team task tracking over Telegram
//!
//! Wires the pieces together: config → store → Telegram gateway → engine +
//! reminder scheduler, then pumps inbound updates until shutdown.
//!
//! Usage:
//!   taskwire                         # config from ~/.taskwire/config.toml
//!   taskwire --config ./dev.toml     # explicit config
//!   taskwire --db-path ./dev.db -v   # overrides + verbose logging

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use taskwire_channels::{TelegramGateway, TelegramPoller};
use taskwire_core::{Gateway, TaskwireConfig};
use taskwire_engine::Engine;
use taskwire_scheduler::ReminderScheduler;
use taskwire_store::Store;

#[derive(Parser)]
#[command(
    name = "taskwire",
    version,
    about = "📋 Taskwire — team task tracker over Telegram"
)]
struct Cli {
    /// Path to config.toml (default: ~/.taskwire/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "taskwire=debug,taskwire_engine=debug,taskwire_scheduler=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => TaskwireConfig::load_from(path)?,
        None => TaskwireConfig::load()?,
    };
    if config.telegram.bot_token.is_empty() {
        bail!("telegram.bot_token is not configured");
    }
    if config.boss_ids.is_empty() {
        tracing::warn!("No boss_ids configured; nobody will be able to create tasks");
    }

    let db_path = cli
        .db_path
        .unwrap_or_else(|| PathBuf::from(&config.db_path));
    let store = Arc::new(Store::open(&db_path).context("open database")?);
    tracing::info!("Database ready at {}", db_path.display());

    let telegram = TelegramGateway::new(config.telegram.bot_token.clone());
    let me = telegram.get_me().await.context("verify bot token")?;
    tracing::info!(
        "Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let poller = TelegramPoller::new(telegram.clone(), config.telegram.poll_interval_secs);
    let gateway: Arc<dyn Gateway> = Arc::new(telegram);

    let engine = Arc::new(Engine::new(&config, store.clone(), gateway.clone()));

    let cancel = CancellationToken::new();
    let scheduler =
        ReminderScheduler::new(store.clone(), gateway.clone(), config.scheduler.tick_secs);
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    let mut updates = poller.start_polling();
    loop {
        tokio::select! {
            maybe = updates.next() => {
                match maybe {
                    Some(update) => {
                        // One task per inbound event; handlers never outlive
                        // the process, and failures are logged inside.
                        let engine = engine.clone();
                        tokio::spawn(async move { engine.handle_update(update).await });
                    }
                    None => {
                        tracing::warn!("Update stream closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    cancel.cancel();
    let _ = scheduler_task.await;
    Ok(())
}
