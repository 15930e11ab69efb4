/// Content generation module
///
/// Turns a keyword/topic (and the source tweet, for replies) into text that
/// fits in a single tweet. Generation never fails from the caller's point of
/// view: any model error yields a fixed fallback string instead.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::prompts;

/// Platform limit on tweet length, in characters
pub const MAX_TWEET_CHARS: usize = 280;

const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("model API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("model returned no text")]
    Empty,
}

/// Language model seen as a black box: prompt in, text out
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis
pub fn truncate_to_limit(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

pub fn fallback_reply(author_handle: &str, keyword: &str) -> String {
    format!("Interesting take on {}! Thanks for sharing @{}", keyword, author_handle)
}

pub fn fallback_post(topic: &str) -> String {
    format!(
        "been diving deep into {} lately... the rabbit hole goes deeper than most people realize",
        topic
    )
}

pub struct ContentGenerator {
    completer: Arc<dyn TextCompleter>,
    max_chars: usize,
}

impl ContentGenerator {
    pub fn new(completer: Arc<dyn TextCompleter>) -> Self {
        Self {
            completer,
            max_chars: MAX_TWEET_CHARS,
        }
    }

    pub async fn generate_reply(&self, source_text: &str, author_handle: &str, keyword: &str) -> String {
        let prompt = prompts::reply_prompt(source_text, author_handle, keyword);
        let text = match self.complete_trimmed(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Error generating reply for @{}: {}", author_handle, e);
                fallback_reply(author_handle, keyword)
            }
        };
        truncate_to_limit(&text, self.max_chars)
    }

    pub async fn generate_post(&self, topic: &str) -> String {
        let prompt = prompts::post_prompt(topic);
        let text = match self.complete_trimmed(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Error generating post about '{}': {}", topic, e);
                fallback_post(topic)
            }
        };
        truncate_to_limit(&text, self.max_chars)
    }

    async fn complete_trimmed(&self, prompt: &str) -> Result<String, GenerationError> {
        let text = self.completer.complete(prompt).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text.to_string())
    }
}
