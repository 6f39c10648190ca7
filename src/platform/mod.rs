pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// A text-bearing update received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingUpdate {
    /// Platform update identifier
    pub update_id: i64,
    /// Chat the update originated from
    pub chat_id: i64,
    /// Display name of the sender
    pub user_name: String,
    /// The message text, absent for non-text events
    pub text: Option<String>,
}

/// Outbound operations the bot needs from a chat platform.
///
/// Implementations are only ever driven from the execution bridge worker,
/// so they need not be safe for concurrent invocation.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Verify credentials and prepare the client for use
    async fn initialize(&self) -> Result<()>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Show the "typing" presence indicator in a chat
    async fn send_typing(&self, chat_id: i64) -> Result<()>;

    async fn set_webhook(&self, url: &str) -> Result<()>;
}
