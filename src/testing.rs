//! Test doubles for the platform and generator seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::llm::{GenerationResult, Generator};
use crate::platform::ChatPlatform;

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Typing(i64),
    Text(i64, String),
    Webhook(String),
}

#[derive(Default)]
struct RecordingInner {
    events: Mutex<Vec<PlatformEvent>>,
    init_calls: AtomicUsize,
    text_attempts: AtomicUsize,
    fail_init: bool,
    fail_typing: bool,
    fail_webhook: bool,
    fail_text_at: Option<usize>,
}

/// Records every outbound call; failures can be scripted per operation
#[derive(Clone, Default)]
pub struct RecordingPlatform {
    inner: Arc<RecordingInner>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(f: impl FnOnce(&mut RecordingInner)) -> Self {
        let mut inner = RecordingInner::default();
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn failing_init() -> Self {
        Self::with(|i| i.fail_init = true)
    }

    pub fn failing_typing() -> Self {
        Self::with(|i| i.fail_typing = true)
    }

    pub fn failing_webhook() -> Self {
        Self::with(|i| i.fail_webhook = true)
    }

    /// Fail the text send with this zero-based index
    pub fn failing_text_at(index: usize) -> Self {
        Self::with(|i| i.fail_text_at = Some(index))
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlatformEvent::Text(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: PlatformEvent) {
        self.inner.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn initialize(&self) -> Result<()> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.inner.fail_init {
            bail!("Unauthorized");
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let index = self.inner.text_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_text_at == Some(index) {
            bail!("send failed for segment {}", index);
        }
        self.record(PlatformEvent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        if self.inner.fail_typing {
            bail!("typing unavailable");
        }
        self.record(PlatformEvent::Typing(chat_id));
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> Result<()> {
        self.record(PlatformEvent::Webhook(url.to_string()));
        if self.inner.fail_webhook {
            bail!("Bad webhook: HTTPS url must be provided");
        }
        Ok(())
    }
}

/// Returns scripted results in order and records the prompts it saw
#[derive(Clone)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<GenerationResult>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<GenerationResult>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, text: &str) -> GenerationResult {
        self.prompts.lock().unwrap().push(text.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {}", text)))
    }
}
