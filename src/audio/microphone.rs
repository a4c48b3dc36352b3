//! cpal-backed [`AudioSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::capture::{self, CHUNK_SAMPLES};
use super::energy::{self, Feed, PhraseDetector, DEFAULT_THRESHOLD};
use super::ring_buffer::{sample_ring, SampleReader};
use crate::speech::{AudioSource, Captured};

const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Grace on top of the phrase limit for audio still in flight.
const PHRASE_SLACK: Duration = Duration::from_millis(500);

/// Wrapper to make `cpal::Stream` Send.
///
/// The stream is only held to keep the device open and dropped on release;
/// it is never used from more than one thread at a time.
struct SendStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendStream {}

struct OpenInput {
    _stream: SendStream,
    reader: SampleReader,
    failed: Arc<AtomicBool>,
}

/// The microphone, opened lazily on first use and closed on release.
pub struct Microphone {
    device_name: Option<String>,
    input: Option<OpenInput>,
    threshold: f32,
}

impl Microphone {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            input: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    fn open(&mut self) -> anyhow::Result<&mut OpenInput> {
        if self
            .input
            .as_ref()
            .is_some_and(|i| i.failed.load(Ordering::SeqCst))
        {
            self.input = None;
            anyhow::bail!("Input stream failed; reopening on next listen");
        }
        if self.input.is_none() {
            let (writer, reader) = sample_ring(None);
            let failed = Arc::new(AtomicBool::new(false));
            let stream =
                capture::open_stream(writer, self.device_name.as_deref(), Arc::clone(&failed))?;
            self.input = Some(OpenInput {
                _stream: SendStream(stream),
                reader,
                failed,
            });
        }
        self.input
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("input not open"))
    }

    async fn measure_ambient(&mut self, duration: Duration) -> anyhow::Result<()> {
        self.open()?.reader.clear();
        tokio::time::sleep(duration).await;
        let samples = self.open()?.reader.drain_all();
        if samples.is_empty() {
            anyhow::bail!("No audio received from input device");
        }
        let ambient = energy::detect(&samples);
        self.threshold = energy::threshold_for_ambient(ambient);
        info!(ambient, threshold = self.threshold, "Calibrated for ambient noise");
        Ok(())
    }

    async fn capture_phrase(
        &mut self,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> anyhow::Result<Captured> {
        let threshold = self.threshold;
        // Audio buffered while the last phrase was transcribed is stale.
        self.open()?.reader.clear();
        collect_phrase(
            || {
                let input = self.open()?;
                let mut chunks = Vec::new();
                while let Some(chunk) = input.reader.pop_chunk(CHUNK_SAMPLES) {
                    chunks.push(chunk);
                }
                Ok(chunks)
            },
            threshold,
            timeout,
            phrase_limit,
        )
        .await
    }
}

/// Poll `pull` until a phrase completes. Waits at most `timeout` for onset,
/// then at most `phrase_limit` plus [`PHRASE_SLACK`] for the phrase, so a
/// device that stops delivering mid-phrase cannot hold the caller.
async fn collect_phrase<F>(
    mut pull: F,
    threshold: f32,
    timeout: Duration,
    phrase_limit: Duration,
) -> anyhow::Result<Captured>
where
    F: FnMut() -> anyhow::Result<Vec<Vec<f32>>>,
{
    let mut detector = PhraseDetector::new(threshold, phrase_limit);
    let onset_deadline = Instant::now() + timeout;
    let mut phrase_deadline: Option<Instant> = None;

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        for chunk in pull()? {
            if detector.feed(&chunk) == Feed::Complete {
                let samples = detector.into_samples();
                debug!(samples = samples.len(), "Phrase captured");
                return Ok(Captured::Speech(samples));
            }
        }

        let now = Instant::now();
        if !detector.started() {
            if now >= onset_deadline {
                return Ok(Captured::Silence);
            }
            continue;
        }
        let deadline = *phrase_deadline.get_or_insert(now + phrase_limit + PHRASE_SLACK);
        if now >= deadline {
            let samples = detector.into_samples();
            warn!(samples = samples.len(), "Input stalled mid-phrase, using partial audio");
            return Ok(Captured::Speech(samples));
        }
    }
}

impl AudioSource for Microphone {
    fn calibrate(&mut self, duration: Duration) -> BoxFuture<'_, anyhow::Result<()>> {
        self.measure_ambient(duration).boxed()
    }

    fn listen(
        &mut self,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> BoxFuture<'_, anyhow::Result<Captured>> {
        self.capture_phrase(timeout, phrase_limit).boxed()
    }

    fn release(&mut self) {
        if self.input.take().is_some() {
            info!("Microphone released");
        }
    }
}
