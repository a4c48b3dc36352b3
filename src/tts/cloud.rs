//! OpenAI speech synthesis.
//!
//! POST `https://api.openai.com/v1/audio/speech` with
//! `response_format: "pcm"` returns raw 24 kHz 16-bit mono PCM.

use tracing::info;

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Sample rate of the `pcm` response format.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Words per minute that map to `speed = 1.0`.
const NORMAL_RATE_WPM: u32 = 150;

/// Map a speaking rate in words per minute onto the API's `speed`
/// parameter (0.25 to 4.0).
pub fn speed_for_rate(rate_wpm: u32) -> f32 {
    (rate_wpm as f32 / NORMAL_RATE_WPM as f32).clamp(0.25, 4.0)
}

/// Little-endian i16 PCM to f32 in [-1, 1). A trailing odd byte is dropped.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

fn request_body(model: &str, text: &str, voice: &str, speed: f32) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "input": text,
        "voice": voice,
        "speed": speed,
        "response_format": "pcm",
    })
}

pub struct OpenAiTts {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: "tts-1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Synthesize `text` to f32 samples at [`PCM_SAMPLE_RATE`].
    pub async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> anyhow::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        info!(voice, text_len = text.len(), speed, "OpenAI TTS request");

        let resp = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.model, text, voice, speed))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI TTS request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI TTS API error {}: {}", status, body);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read OpenAI TTS response: {}", e))?;
        let samples = decode_pcm16(&bytes);
        info!(samples = samples.len(), "OpenAI TTS synthesis complete");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_mapping() {
        assert_eq!(speed_for_rate(150), 1.0);
        assert_eq!(speed_for_rate(300), 2.0);
        assert_eq!(speed_for_rate(10), 0.25);
        assert_eq!(speed_for_rate(5000), 4.0);
    }

    #[test]
    fn test_decode_pcm16() {
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0x7f];
        let samples = decode_pcm16(&bytes);
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_request_body() {
        let body = request_body("tts-1", "hello", "nova", 1.5);
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["response_format"], "pcm");
        assert_eq!(body["speed"], 1.5);
    }
}
