//! AI completion service contract.
//!
//! Failures never surface as `Err`: they are embedded in the response text
//! (`[AI request failed: ...]`) with [`AiResponse::error`] set, so speech
//! output, auto-write and the save offer always have a string to act on.

pub mod openai;

use futures_util::future::BoxFuture;

pub use openai::OpenAiChat;

/// Sampling temperature used for every request.
pub const TEMPERATURE: f32 = 0.2;

/// Default output budget for a plain question.
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Clone, PartialEq)]
pub struct AiQuery {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

impl AiQuery {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiResponse {
    pub text: String,
    /// Set when `text` is an embedded error marker rather than an answer.
    pub error: Option<String>,
}

impl AiResponse {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            text: format!("[AI request failed: {error}]"),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// External completion backend.
pub trait CompletionService: Send + Sync {
    fn complete(&self, query: AiQuery) -> BoxFuture<'_, AiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_response_embeds_marker() {
        let resp = AiResponse::failed("quota exceeded");
        assert!(resp.is_error());
        assert_eq!(resp.text, "[AI request failed: quota exceeded]");
    }

    #[test]
    fn test_answer_is_not_error() {
        let resp = AiResponse::answer("42");
        assert!(!resp.is_error());
        assert_eq!(resp.text, "42");
    }

    #[test]
    fn test_query_defaults() {
        let q = AiQuery::new("hi").with_max_tokens(2000);
        assert_eq!(q.max_tokens, 2000);
        assert!(q.system_prompt.is_none());
    }
}
