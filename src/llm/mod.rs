pub mod retry;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::GeminiConfig;

/// Outcome of a single generation call
pub type GenerationResult = std::result::Result<String, GenerationError>;

/// Why a generation call produced no text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Connection failure, timeout or an unreadable response body
    #[error("{0}")]
    Transport(String),
    /// The service answered with a non-success status
    #[error("API error: {status} - {body}")]
    Upstream { status: u16, body: String },
    /// The service answered 200 but produced no candidate text
    #[error("no candidates in response: {raw}")]
    NoCandidates { raw: String },
}

impl GenerationError {
    /// Transport failures and 5xx responses may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Upstream { status, .. } => *status >= 500,
            GenerationError::NoCandidates { .. } => false,
        }
    }
}

/// Anything that turns user text into generated text
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, text: &str) -> GenerationResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// `generateContent` request body: one user-text part
#[derive(Debug, Serialize)]
pub struct GenerationRequest {
    pub contents: Vec<Content>,
}

impl GenerationRequest {
    pub fn from_text(text: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(text.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, joining its text parts
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let texts: Vec<String> = content.parts.into_iter().filter_map(|p| p.text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build Gemini HTTP client")?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, text: &str) -> GenerationResult {
        let url = self.endpoint();
        let request = GenerationRequest::from_text(text);

        debug!("Sending request to Gemini: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Transport(format!("Failed to parse Gemini response: {}", e)))?;

        parsed
            .first_text()
            .ok_or(GenerationError::NoCandidates { raw: body })
    }
}
