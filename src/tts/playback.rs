//! Audio playback via rodio.

use cpal::traits::HostTrait;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

/// Whether the host has a default output device.
pub fn output_available() -> bool {
    cpal::default_host().default_output_device().is_some()
}

/// Plays mono f32 PCM through the default output device. Not `Send`:
/// create it on the thread that plays.
pub struct AudioPlayer {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
}

impl AudioPlayer {
    pub fn new() -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| anyhow::anyhow!("Failed to open audio output: {}", e))?;
        Ok(Self {
            _stream: stream,
            stream_handle,
        })
    }

    /// Play samples at `volume` (0.0 to 1.0), blocking until done.
    pub fn play(&self, samples: Vec<f32>, sample_rate: u32, volume: f32) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| anyhow::anyhow!("Failed to create audio sink: {}", e))?;
        sink.set_volume(volume.clamp(0.0, 1.0));
        sink.append(SamplesBuffer::new(1, sample_rate, samples));
        sink.sleep_until_end();
        Ok(())
    }
}
