mod bot;
mod bridge;
mod config;
mod llm;
mod platform;
mod responder;
mod server;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::UpdateHandler;
use crate::bridge::ExecutionBridge;
use crate::config::Config;
use crate::llm::retry::RetryingGenerator;
use crate::llm::GeminiClient;
use crate::platform::telegram::TelegramPlatform;
use crate::responder::Responder;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gemini_telegram_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional TOML file; environment variables take precedence
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = Config::load(config_path.as_deref()).context("Invalid configuration")?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.gemini.model);
    info!("  Port: {}", config.port);
    info!(
        "  Hostname: {}",
        config.telegram.external_hostname.as_deref().unwrap_or("(not set)")
    );
    info!("  Generation attempts: {}", config.retry.max_attempts);
    info!("  Chunk failure policy: {}", config.chunk_failure_policy);

    let gemini = GeminiClient::new(config.gemini.clone())?;
    let generator = RetryingGenerator::new(
        gemini,
        config.retry.max_attempts,
        config.retry.base_delay,
    );
    let handler = Arc::new(UpdateHandler::new(
        Arc::new(generator),
        Responder::new(config.chunk_failure_policy),
    ));

    let platform = Arc::new(TelegramPlatform::new(&config.telegram.bot_token));
    let bridge = ExecutionBridge::start(platform);

    // Bad credentials must stop startup, not the first request
    bridge
        .ensure_initialized()
        .await
        .context("Failed to initialize Telegram bot")?;

    if config.telegram.register_webhook_on_startup {
        if let Err(e) = server::register_webhook(
            &bridge,
            config.telegram.external_hostname.as_deref(),
            &config.telegram.secret_path,
        )
        .await
        {
            warn!("Startup webhook registration skipped: {:#}", e);
        }
    }

    let state = AppState::new(
        bridge,
        handler,
        &config.telegram.secret_path,
        config.telegram.external_hostname.as_deref(),
    );

    info!("Bot is starting...");
    server::serve(state, config.port).await?;

    Ok(())
}
