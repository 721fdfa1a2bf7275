mod bot;
mod config;
mod correlator;
mod dispatcher;
mod error;
mod platform;
mod scheduler;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::{Config, ServerMode};
use crate::correlator::Correlator;
use crate::dispatcher::Command;
use crate::platform::telegram::TelegramSender;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,doctor_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An explicit path must exist; the default one is optional
    let (config_path, required) = match std::env::args().nth(1) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from("config.toml"), false),
    };

    info!("Loading configuration from: {}", config_path.display());
    let mut config = Config::load(&config_path, required)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Admin: {}", config.telegram.admin_id);
    info!("  Mode: {}", config.server.mode);
    info!("  Correlation: {}", config.correlation.strategy);

    let bot = Bot::new(&config.telegram.bot_token);

    if config.telegram.bot_username.is_none() {
        match bot.get_me().await {
            Ok(me) => config.telegram.bot_username = me.user.username.clone(),
            Err(e) => warn!("getMe failed, /cmd@bot forms won't be recognised: {}", e),
        }
    }
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to publish the command list: {}", e);
    }

    let correlator = Arc::new(Correlator::new(&config.correlation));
    let sender = Arc::new(TelegramSender::new(bot.clone()));
    let state = Arc::new(AppState::new(&config, sender, correlator.clone()));

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(
        &mut scheduler,
        correlator,
        &config.correlation.sweep_cron,
    )
    .await?;
    scheduler.start().await?;

    info!("Relay is starting...");
    match config.server.mode {
        ServerMode::Webhook => {
            match config.webhook_url() {
                Some(url) => {
                    server::register_webhook(&bot, &url, config.server.secret_token.as_deref())
                        .await?
                }
                None => warn!("No public URL configured; expecting the webhook to be set already"),
            }
            server::serve(state, &config).await?;
        }
        ServerMode::Polling => bot::run_polling(bot, state).await?,
    }

    scheduler.shutdown().await?;
    Ok(())
}
