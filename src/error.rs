//! Error taxonomy for the orchestration seams.
//!
//! Adapters (STT, TTS, AI, audio) use `anyhow` internally; these variants are
//! what crosses the boundaries the consumer loop reacts to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Microphone (or another optional device) is absent. Non-fatal: the
    /// feature is disabled.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A capture loop is already running.
    #[error("speech capture is already active")]
    AlreadyListening,

    /// The consumer side of the result sink is gone.
    #[error("result sink closed, consumer is no longer receiving")]
    SinkClosed,

    /// Settings could not be written. In-memory settings stay in effect.
    #[error("failed to persist settings: {0}")]
    ConfigPersistence(String),

    /// No API key in the environment or settings. The only fatal error.
    #[error("no OpenAI API key found: set OPENAI_API_KEY or `openai_api_key` in {0}")]
    MissingCredentials(String),
}
