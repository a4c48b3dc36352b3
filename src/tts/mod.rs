//! Text-to-speech output.
//!
//! [`Speaker`] queues utterances: a tokio task synthesizes them in order and
//! a dedicated thread owns the output device and plays them one at a time.
//! Without an output device the app uses [`Silent`].

pub mod cloud;
pub mod playback;

use std::sync::mpsc as std_mpsc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{self, SharedSettings};
use cloud::{speed_for_rate, OpenAiTts, PCM_SAMPLE_RATE};
use playback::AudioPlayer;

/// Speech output seam. `speak` queues and returns; it never waits for audio.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// No-op output for hosts without a speaker.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl SpeechOutput for Silent {
    fn speak(&self, text: &str) -> anyhow::Result<()> {
        debug!(chars = text.len(), "TTS unavailable, skipping speech");
        Ok(())
    }
}

struct Playback {
    samples: Vec<f32>,
    volume: f32,
}

/// OpenAI TTS with rodio playback. Voice, rate and volume are read from
/// settings per utterance.
pub struct Speaker {
    queue: mpsc::UnboundedSender<String>,
}

impl Speaker {
    /// Open the output device and start the synthesis task.
    pub async fn spawn(tts: OpenAiTts, settings: SharedSettings) -> anyhow::Result<Self> {
        let (pcm_tx, pcm_rx) = std_mpsc::channel::<Playback>();

        start_device_thread("tts-playback", AudioPlayer::new, move |player| {
            for item in pcm_rx {
                if let Err(e) = player.play(item.samples, PCM_SAMPLE_RATE, item.volume) {
                    warn!(error = %e, "Playback failed");
                }
            }
            debug!("Playback thread exiting");
        })
        .await?;

        let (queue, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                let s = config::snapshot(&settings);
                match tts
                    .synthesize(&text, &s.tts_voice, speed_for_rate(s.tts_rate))
                    .await
                {
                    Ok(samples) => {
                        let item = Playback {
                            samples,
                            volume: s.tts_volume,
                        };
                        if pcm_tx.send(item).is_err() {
                            error!("Playback thread gone, stopping speech output");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, chars = text.len(), "Speech synthesis failed"),
                }
            }
        });

        info!("Speech output ready");
        Ok(Self { queue })
    }
}

/// Start a thread that opens a device with `open` and hands it to `run`.
/// Resolves once the device is open, or with the open error.
async fn start_device_thread<D, O, R>(name: &str, open: O, run: R) -> anyhow::Result<()>
where
    O: FnOnce() -> anyhow::Result<D> + Send + 'static,
    R: FnOnce(D) + Send + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel::<anyhow::Result<()>>();
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let device = match open() {
                Ok(device) => {
                    let _ = ready_tx.send(Ok(()));
                    device
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            run(device);
        })?;

    ready_rx
        .await
        .map_err(|_| anyhow::anyhow!("{name} thread exited during startup"))?
}

impl SpeechOutput for Speaker {
    fn speak(&self, text: &str) -> anyhow::Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.queue
            .send(text.to_string())
            .map_err(|_| anyhow::anyhow!("speech queue closed"))
    }
}
