//! The background listen -> transcribe -> post loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{CapturePhase, CaptureState};
use super::{AudioSource, Captured, Transcriber, Transcription, Utterance};
use crate::error::CoreError;
use crate::sink::{ResultSink, SinkItem};

/// Loop timing. Stop latency is bounded by
/// `listen_timeout + phrase_time_limit` plus one transcription call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    pub calibration: Duration,
    pub listen_timeout: Duration,
    pub phrase_time_limit: Duration,
    /// Pause after a failed listen before trying again.
    pub retry_backoff: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            calibration: Duration::from_secs(1),
            listen_timeout: Duration::from_secs(5),
            phrase_time_limit: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Owner of the capture loop. At most one loop is active at a time; a loop
/// started right after a stop waits for the previous one to release the
/// device.
pub struct SpeechCapture {
    state: Arc<CaptureState>,
    source: Arc<Mutex<Box<dyn AudioSource>>>,
    transcriber: Arc<dyn Transcriber>,
    sink: ResultSink,
    timing: CaptureTiming,
}

impl SpeechCapture {
    pub fn new(
        source: Box<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        sink: ResultSink,
        timing: CaptureTiming,
    ) -> Self {
        Self {
            state: CaptureState::new(),
            source: Arc::new(Mutex::new(source)),
            transcriber,
            sink,
            timing,
        }
    }

    pub fn state(&self) -> &Arc<CaptureState> {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn phase(&self) -> CapturePhase {
        self.state.phase()
    }

    pub fn timing(&self) -> CaptureTiming {
        self.timing
    }

    /// Start the background loop.
    pub fn start(&self) -> Result<JoinHandle<()>, CoreError> {
        let generation = self
            .state
            .activate()
            .ok_or(CoreError::AlreadyListening)?;
        info!(generation, "Speech capture starting");

        let ctx = LoopContext {
            generation,
            state: Arc::clone(&self.state),
            source: Arc::clone(&self.source),
            transcriber: Arc::clone(&self.transcriber),
            sink: self.sink.clone(),
            timing: self.timing,
        };
        Ok(tokio::spawn(capture_loop(ctx)))
    }

    /// Request a stop. Returns immediately; the loop exits at its next
    /// iteration boundary. Returns whether a loop was active.
    pub fn stop(&self) -> bool {
        let was_active = self.state.deactivate();
        if was_active {
            info!("Speech capture stop requested");
        }
        was_active
    }
}

struct LoopContext {
    generation: u64,
    state: Arc<CaptureState>,
    source: Arc<Mutex<Box<dyn AudioSource>>>,
    transcriber: Arc<dyn Transcriber>,
    sink: ResultSink,
    timing: CaptureTiming,
}

async fn capture_loop(ctx: LoopContext) {
    let generation = ctx.generation;
    let mut source = ctx.source.lock().await;

    if !ctx.state.is_current(generation) {
        debug!(generation, "Stopped before the device was free");
        ctx.state.finish(generation);
        return;
    }

    ctx.state.set_phase(generation, CapturePhase::Calibrating);
    if let Err(e) = source.calibrate(ctx.timing.calibration).await {
        error!(error = %e, "Microphone calibration failed");
        source.release();
        ctx.state.finish(generation);
        let _ = ctx.sink.post(SinkItem::CaptureStopped {
            reason: Some(format!("Microphone calibration failed: {e}")),
        });
        return;
    }
    debug!(generation, "Calibration complete");

    while ctx.state.is_current(generation) {
        ctx.state.set_phase(generation, CapturePhase::Listening);
        let captured = source
            .listen(ctx.timing.listen_timeout, ctx.timing.phrase_time_limit)
            .await;

        let audio = match captured {
            Ok(Captured::Speech(audio)) => audio,
            Ok(Captured::Silence) => continue,
            Err(e) => {
                warn!(error = %e, "Listen failed, retrying");
                if ctx.sink.is_closed() {
                    break;
                }
                tokio::time::sleep(ctx.timing.retry_backoff).await;
                continue;
            }
        };

        ctx.state.set_phase(generation, CapturePhase::Transcribing);
        let utterance = match ctx.transcriber.transcribe(&audio).await {
            Ok(Transcription::Text(text)) => {
                info!(chars = text.len(), "Speech recognized");
                Utterance::voice(text)
            }
            Ok(Transcription::NotUnderstood) => {
                debug!(samples = audio.len(), "Speech not understood");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                Utterance::transcription_error(&e.to_string())
            }
        };

        if ctx.sink.post(SinkItem::Utterance(utterance)).is_err() {
            break;
        }
    }

    source.release();
    ctx.state.finish(generation);
    info!(generation, "Speech capture stopped");
}
