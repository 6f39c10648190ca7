use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tracing::info;

use crate::platform::{ChatPlatform, IncomingUpdate};

/// Telegram Update object, reduced to the fields the bot reads
#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    edited_message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    first_name: String,
}

/// Parse a webhook body into an update.
///
/// Returns `Ok(None)` for a JSON `null` body and for updates that carry no
/// message (callback queries, channel posts and the like).
pub fn parse_update(body: &[u8]) -> Result<Option<IncomingUpdate>> {
    let update: Option<TelegramUpdate> =
        serde_json::from_slice(body).context("Failed to parse Telegram update")?;

    Ok(update.and_then(|update| {
        let update_id = update.update_id;
        update
            .message
            .or(update.edited_message)
            .map(|msg| IncomingUpdate {
                update_id,
                chat_id: msg.chat.id,
                user_name: msg
                    .from
                    .map(|u| u.first_name)
                    .unwrap_or_else(|| "there".to_string()),
                text: msg.text,
            })
    }))
}

/// Build the public webhook URL Telegram should call
pub fn webhook_url(hostname: &str, secret_path: &str) -> String {
    format!(
        "https://{}/{}",
        hostname.trim_end_matches('/'),
        secret_path.trim_start_matches('/')
    )
}

/// Telegram Bot API client backed by teloxide
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn initialize(&self) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .context("Telegram rejected the bot token")?;
        info!("Telegram bot initialized as {} ({})", me.user.first_name, me.user.id);
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .with_context(|| format!("Failed to send typing action to chat {}", chat_id))?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> Result<()> {
        // The URL embeds the secret path, keep it out of the error
        let url = reqwest::Url::parse(url).context("Invalid webhook URL")?;
        self.bot
            .set_webhook(url)
            .await
            .context("Telegram setWebhook failed")?;
        Ok(())
    }
}
