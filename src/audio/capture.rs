//! Microphone input via cpal.
//!
//! Opens the default (or named) input device at its native rate, converts to
//! 16 kHz mono f32 and pushes fixed-size chunks into the sample ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{error, info};

use super::ring_buffer::SampleWriter;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// 30 ms at 16 kHz.
pub const CHUNK_SAMPLES: usize = 480;

fn find_device(device_name: Option<&str>) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| anyhow::anyhow!("Failed to enumerate input devices: {e}"))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow::anyhow!("Input device not found: {name}")),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device available")),
    }
}

/// Whether an input device (named, or the default) can be opened.
pub fn input_available(device_name: Option<&str>) -> bool {
    find_device(device_name)
        .and_then(|d| {
            d.default_input_config()
                .map_err(|e| anyhow::anyhow!("{e}"))
        })
        .is_ok()
}

/// Linear resampler over mono samples.
pub(crate) fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let s0 = input.get(idx).copied().unwrap_or(0.0);
            let s1 = input.get(idx + 1).copied().unwrap_or(s0);
            s0 + frac * (s1 - s0)
        })
        .collect()
}

/// Average interleaved frames down to one channel.
pub(crate) fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Open and start an input stream. The stream must be kept alive; dropping
/// it closes the device. `failed` is raised if the stream reports an error.
pub fn open_stream(
    mut writer: SampleWriter,
    device_name: Option<&str>,
    failed: Arc<AtomicBool>,
) -> anyhow::Result<Stream> {
    let device = find_device(device_name)?;
    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    let default_config = device
        .default_input_config()
        .map_err(|e| anyhow::anyhow!("Failed to get default input config: {e}"))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(device = %dev_name, native_rate, channels, "Opening input device");

    let mut pending: Vec<f32> = Vec::with_capacity(CHUNK_SAMPLES * 2);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = to_mono(data, channels);
                pending.extend(resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE));
                while pending.len() >= CHUNK_SAMPLES {
                    // Overflow drops the newest audio; the reader clears
                    // stale samples before every listen anyway.
                    writer.push_slice(&pending[..CHUNK_SAMPLES]);
                    pending.drain(..CHUNK_SAMPLES);
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
                failed.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| anyhow::anyhow!("Failed to build input stream: {e}"))?;

    stream
        .play()
        .map_err(|e| anyhow::anyhow!("Failed to start input stream: {e}"))?;
    Ok(stream)
}
