//! Background speech capture.
//!
//! A [`SpeechCapture`] runs one loop at a time: calibrate once, then
//! listen -> transcribe -> post, until stopped. The microphone and the
//! speech-to-text engine sit behind [`AudioSource`] and [`Transcriber`] so
//! the loop can run against fakes.

pub mod listener;
pub mod state;

use std::time::Duration;

use futures_util::future::BoxFuture;

pub use listener::{CaptureTiming, SpeechCapture};
pub use state::{CapturePhase, CaptureState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceSource {
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceKind {
    Transcript,
    /// The STT backend failed; the text is a marker, not speech.
    TranscriptionError,
}

/// One transcribed unit of speech input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub source: UtteranceSource,
    pub kind: UtteranceKind,
}

impl Utterance {
    pub fn voice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: UtteranceSource::Voice,
            kind: UtteranceKind::Transcript,
        }
    }

    pub fn transcription_error(error: &str) -> Self {
        Self {
            text: format!("[STT error: {error}]"),
            source: UtteranceSource::Voice,
            kind: UtteranceKind::TranscriptionError,
        }
    }

    pub fn is_error_marker(&self) -> bool {
        self.kind == UtteranceKind::TranscriptionError
    }
}

/// Result of one listen call.
#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    /// 16 kHz mono samples of one phrase.
    Speech(Vec<f32>),
    /// No speech onset within the listen timeout.
    Silence,
}

/// Exclusive handle on an input device.
pub trait AudioSource: Send {
    /// Measure ambient noise for `duration` to set the speech threshold.
    fn calibrate(&mut self, duration: Duration) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Wait up to `timeout` for speech onset, then record at most
    /// `phrase_limit` of audio.
    fn listen(
        &mut self,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> BoxFuture<'_, anyhow::Result<Captured>>;

    /// Close the device. Called when the loop exits.
    fn release(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    Text(String),
    /// The engine heard audio but could not make out any words.
    NotUnderstood,
}

/// Speech-to-text engine. `Err` means a backend failure (network, quota).
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(&'a self, audio: &'a [f32]) -> BoxFuture<'a, anyhow::Result<Transcription>>;
}
