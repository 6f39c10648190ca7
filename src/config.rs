use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// What the responder does when one segment of a long reply fails to send
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFailurePolicy {
    /// Stop at the first failed segment
    #[default]
    Abort,
    /// Keep sending the remaining segments
    Continue,
}

impl std::fmt::Display for ChunkFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkFailurePolicy::Abort => write!(f, "abort"),
            ChunkFailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for ChunkFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(ChunkFailurePolicy::Abort),
            "continue" => Ok(ChunkFailurePolicy::Continue),
            other => Err(format!("expected `abort` or `continue`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Path segment Telegram posts updates to
    pub secret_path: String,
    /// Public hostname used to build the webhook URL
    pub external_hostname: Option<String>,
    pub register_webhook_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub gemini: GeminiConfig,
    pub retry: RetryConfig,
    pub port: u16,
    pub chunk_failure_policy: ChunkFailurePolicy,
}

// Optional TOML layer. Every key may be omitted; the environment wins.

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    telegram: FileTelegram,
    #[serde(default)]
    gemini: FileGemini,
    #[serde(default)]
    server: FileServer,
}

#[derive(Debug, Deserialize, Default)]
struct FileTelegram {
    bot_token: Option<String>,
    secret_path: Option<String>,
    external_hostname: Option<String>,
    register_webhook_on_startup: Option<bool>,
    chunk_failure_policy: Option<ChunkFailurePolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct FileGemini {
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_base_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FileServer {
    port: Option<u16>,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_retry_base_ms() -> u64 {
    500
}

fn parse_var<T>(name: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", name, value, e))
    })
    .transpose()
}

fn parse_flag(name: &str, raw: Option<String>) -> Result<Option<bool>> {
    raw.map(|value| match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Invalid value for {}: {:?} (expected a boolean)", name, value)),
    })
    .transpose()
}

impl Config {
    /// Load configuration from an optional TOML file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let bot_token = env("TELEGRAM_TOKEN").or(file.telegram.bot_token);
        let api_key = env("GEMINI_API_KEY").or(file.gemini.api_key);

        let mut missing = Vec::new();
        if bot_token.is_none() {
            missing.push("TELEGRAM_TOKEN");
        }
        if api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        let (Some(bot_token), Some(api_key)) = (bot_token, api_key) else {
            bail!(
                "Missing required configuration: {}",
                missing.join(", ")
            );
        };

        let secret_path = env("WEBHOOK_SECRET_PATH")
            .or(file.telegram.secret_path)
            .unwrap_or_else(|| bot_token.clone());
        let external_hostname =
            env("RENDER_EXTERNAL_HOSTNAME").or(file.telegram.external_hostname);
        let register_webhook_on_startup =
            parse_flag("REGISTER_WEBHOOK_ON_STARTUP", env("REGISTER_WEBHOOK_ON_STARTUP"))?
                .or(file.telegram.register_webhook_on_startup)
                .unwrap_or(true);
        let chunk_failure_policy =
            parse_var::<ChunkFailurePolicy>("CHUNK_FAILURE_POLICY", env("CHUNK_FAILURE_POLICY"))?
                .or(file.telegram.chunk_failure_policy)
                .unwrap_or_default();

        let model = env("GEMINI_MODEL")
            .or(file.gemini.model)
            .unwrap_or_else(default_model);
        let api_base = env("GEMINI_API_BASE")
            .or(file.gemini.api_base)
            .unwrap_or_else(default_api_base);
        let timeout = parse_var::<u64>("GEMINI_TIMEOUT_SECS", env("GEMINI_TIMEOUT_SECS"))?
            .or(file.gemini.timeout_secs)
            .map(Duration::from_secs);
        let max_attempts =
            parse_var::<u32>("GENERATION_MAX_ATTEMPTS", env("GENERATION_MAX_ATTEMPTS"))?
                .or(file.gemini.max_attempts)
                .unwrap_or(1);
        if max_attempts == 0 {
            bail!("Invalid value for GENERATION_MAX_ATTEMPTS: must be at least 1");
        }
        let retry_base_ms =
            parse_var::<u64>("GENERATION_RETRY_BASE_MS", env("GENERATION_RETRY_BASE_MS"))?
                .or(file.gemini.retry_base_ms)
                .unwrap_or_else(default_retry_base_ms);

        let port = parse_var::<u16>("PORT", env("PORT"))?
            .or(file.server.port)
            .unwrap_or_else(default_port);

        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                secret_path,
                external_hostname,
                register_webhook_on_startup,
            },
            gemini: GeminiConfig {
                api_key,
                model,
                api_base,
                timeout,
            },
            retry: RetryConfig {
                max_attempts,
                base_delay: Duration::from_millis(retry_base_ms),
            },
            port,
            chunk_failure_policy,
        })
    }
}
