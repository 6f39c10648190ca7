use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::llm::{GenerationError, Generator};
use crate::platform::{ChatPlatform, IncomingUpdate};
use crate::responder::Responder;

const HELP_TEXT: &str = "Send me a message and I'll use Google Gemini AI to answer you.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
}

/// How the bot should treat a piece of inbound text
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Command(Command),
    UnknownCommand(&'a str),
    Prompt(&'a str),
}

fn route(text: &str) -> Route<'_> {
    let Some(rest) = text.strip_prefix('/') else {
        return Route::Prompt(text);
    };
    // "/start@MyBot payload" -> "start"
    let name = rest
        .split(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();
    match name {
        // A lone "/" is not a bot command
        "" => Route::Prompt(text),
        "start" => Route::Command(Command::Start),
        "help" => Route::Command(Command::Help),
        _ => Route::UnknownCommand(name),
    }
}

fn greeting(user_name: &str) -> String {
    format!(
        "Hello {}! I'm a bot powered by Google Gemini AI. Send me a message to chat.",
        user_name
    )
}

/// Message shown to the user when generation fails
fn describe_failure(err: &GenerationError) -> String {
    match err {
        GenerationError::Transport(message) => format!("Sorry, an error occurred: {}", message),
        GenerationError::Upstream { .. } => err.to_string(),
        GenerationError::NoCandidates { .. } => "No response received from Gemini API.".to_string(),
    }
}

/// Routes updates to the command replies or the generation pipeline
pub struct UpdateHandler {
    generator: Arc<dyn Generator>,
    responder: Responder,
}

impl UpdateHandler {
    pub fn new(generator: Arc<dyn Generator>, responder: Responder) -> Self {
        Self {
            generator,
            responder,
        }
    }

    /// Handle one update; every log line emitted meanwhile carries its ids.
    pub async fn process_update(
        &self,
        platform: &dyn ChatPlatform,
        update: &IncomingUpdate,
    ) -> Result<()> {
        let span = info_span!(
            "update",
            update_id = update.update_id,
            chat_id = update.chat_id
        );
        self.dispatch(platform, update).instrument(span).await
    }

    async fn dispatch(&self, platform: &dyn ChatPlatform, update: &IncomingUpdate) -> Result<()> {
        let Some(text) = update.text.as_deref() else {
            debug!("Ignoring update without text");
            return Ok(());
        };

        info!("Telegram message from {}: {}", update.user_name, text);

        match route(text) {
            Route::Command(command) => self.handle_command(platform, update, command).await,
            Route::UnknownCommand(name) => {
                debug!("Ignoring unknown command /{}", name);
                Ok(())
            }
            Route::Prompt(prompt) => self.handle_prompt(platform, update, prompt).await,
        }
    }

    async fn handle_command(
        &self,
        platform: &dyn ChatPlatform,
        update: &IncomingUpdate,
        command: Command,
    ) -> Result<()> {
        let reply = match command {
            Command::Start => greeting(&update.user_name),
            Command::Help => HELP_TEXT.to_string(),
        };
        platform.send_text(update.chat_id, &reply).await
    }

    async fn handle_prompt(
        &self,
        platform: &dyn ChatPlatform,
        update: &IncomingUpdate,
        prompt: &str,
    ) -> Result<()> {
        if let Err(e) = platform.send_typing(update.chat_id).await {
            warn!("Failed to send typing indicator: {:#}", e);
        }

        match self.generator.generate(prompt).await {
            Ok(answer) => {
                info!("Generated {} chars", answer.chars().count());
                self.responder
                    .deliver(platform, update.chat_id, &answer)
                    .await
            }
            Err(e) => {
                error!("Gemini call failed: {}", e);
                platform
                    .send_text(update.chat_id, &describe_failure(&e))
                    .await
            }
        }
    }
}
