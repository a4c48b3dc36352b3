//! OpenAI Whisper API transcription.

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::multipart;
use tracing::debug;

use crate::speech::{Transcriber, Transcription};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const SAMPLE_RATE: u32 = 16_000;

/// Encode f32 audio samples as 16-bit PCM WAV bytes (mono).
pub(crate) fn encode_wav(audio: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_size = audio.len() as u32 * 2;
    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // channels
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in audio {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    buf
}

/// Map the API's `text` field. Whisper answers blank audio with an empty
/// (or whitespace) transcript rather than an error.
fn parse_transcript(json: &serde_json::Value) -> Transcription {
    match json["text"].as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Transcription::Text(text.to_string()),
        _ => Transcription::NotUnderstood,
    }
}

/// Whisper over the OpenAI audio API.
pub struct OpenAiWhisper {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiWhisper {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: TRANSCRIPTIONS_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, audio: &[f32]) -> anyhow::Result<Transcription> {
        let wav = encode_wav(audio, SAMPLE_RATE);
        debug!(bytes = wav.len(), "Sending audio to Whisper API");

        let file_part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .text("model", "whisper-1")
            .part("file", file_part);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await?;
        Ok(parse_transcript(&json))
    }
}

impl Transcriber for OpenAiWhisper {
    fn transcribe<'a>(&'a self, audio: &'a [f32]) -> BoxFuture<'a, anyhow::Result<Transcription>> {
        self.request(audio).boxed()
    }
}
