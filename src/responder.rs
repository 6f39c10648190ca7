use anyhow::Result;
use tracing::{debug, error};

use crate::config::ChunkFailurePolicy;
use crate::platform::ChatPlatform;

/// Telegram's per-message text limit
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Split text into contiguous segments of at most `max_len` characters.
///
/// Segments are cut at exact character counts so that concatenating them
/// reproduces the input. Text within the limit comes back as one segment.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_len {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);

    chunks
}

/// Sends replies to a chat, one message per segment, in order
pub struct Responder {
    max_len: usize,
    policy: ChunkFailurePolicy,
}

impl Responder {
    pub fn new(policy: ChunkFailurePolicy) -> Self {
        Self {
            max_len: TELEGRAM_MESSAGE_LIMIT,
            policy,
        }
    }

    pub async fn deliver(
        &self,
        platform: &dyn ChatPlatform,
        chat_id: i64,
        text: &str,
    ) -> Result<()> {
        let chunks = split_message(text, self.max_len);
        let total = chunks.len();
        let mut first_error = None;

        for (i, chunk) in chunks.into_iter().enumerate() {
            debug!(chat_id, "Sending segment {}/{}", i + 1, total);
            if let Err(e) = platform.send_text(chat_id, chunk).await {
                error!(chat_id, "Failed to send segment {}/{}: {:#}", i + 1, total, e);
                match self.policy {
                    ChunkFailurePolicy::Abort => return Err(e),
                    ChunkFailurePolicy::Continue => {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PlatformEvent, RecordingPlatform};

    #[test]
    fn test_short_text_is_one_segment() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
        assert_eq!(split_message("", 4096), vec![""]);

        let exact = "x".repeat(4096);
        assert_eq!(split_message(&exact, 4096), vec![exact.as_str()]);
    }

    #[test]
    fn test_long_text_splits_at_exact_counts() {
        let text: String = (0..9000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_message(&text, 4096);

        let lens: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lens, vec![4096, 4096, 808]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 4);

        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_segment_count_is_ceiling() {
        for len in [1usize, 4095, 4096, 4097, 8192, 8193, 12288, 20000] {
            let text = "z".repeat(len);
            let chunks = split_message(&text, 4096);
            assert_eq!(chunks.len(), len.div_ceil(4096), "len {}", len);
            assert!(chunks.iter().all(|c| c.len() <= 4096));
            assert_eq!(chunks.concat(), text);
        }
    }

    #[tokio::test]
    async fn test_deliver_sends_in_order() {
        let platform = RecordingPlatform::new();
        let text = format!("{}{}{}", "a".repeat(4096), "b".repeat(4096), "c".repeat(10));

        Responder::new(ChunkFailurePolicy::Abort)
            .deliver(&platform, 42, &text)
            .await
            .unwrap();

        assert_eq!(
            platform.events(),
            vec![
                PlatformEvent::Text(42, "a".repeat(4096)),
                PlatformEvent::Text(42, "b".repeat(4096)),
                PlatformEvent::Text(42, "c".repeat(10)),
            ]
        );
    }

    #[tokio::test]
    async fn test_deliver_aborts_on_first_failure() {
        let platform = RecordingPlatform::failing_text_at(1);
        let text = "q".repeat(4096 * 3);

        let result = Responder::new(ChunkFailurePolicy::Abort)
            .deliver(&platform, 1, &text)
            .await;

        assert!(result.is_err());
        assert_eq!(platform.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_deliver_continue_attempts_remaining() {
        let platform = RecordingPlatform::failing_text_at(1);
        let text = "q".repeat(4096 * 3);

        let result = Responder::new(ChunkFailurePolicy::Continue)
            .deliver(&platform, 1, &text)
            .await;

        assert!(result.is_err());
        assert_eq!(platform.texts().len(), 2);
    }
}
