use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::llm::{GenerationResult, Generator};

/// Retries retryable generation failures with exponential backoff.
///
/// With `max_attempts == 1` this is a transparent pass-through.
pub struct RetryingGenerator<G> {
    inner: G,
    max_attempts: u32,
    base_delay: Duration,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, text: &str) -> GenerationResult {
        let mut attempt = 0;
        loop {
            match self.inner.generate(text).await {
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Generation attempt {} of {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
