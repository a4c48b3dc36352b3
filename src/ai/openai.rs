//! OpenAI chat completions adapter.
//!
//! POST `https://api.openai.com/v1/chat/completions`
//! Body: `{"model", "messages", "max_tokens", "temperature"}`

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{info, warn};

use super::{AiQuery, AiResponse, CompletionService, TEMPERATURE};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiChat {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at an OpenAI-compatible server instead of api.openai.com.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn request(&self, query: &AiQuery) -> anyhow::Result<String> {
        let body = build_request_body(&self.model, query);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await?;
        extract_content(&json)
    }
}

impl CompletionService for OpenAiChat {
    fn complete(&self, query: AiQuery) -> BoxFuture<'_, AiResponse> {
        async move {
            match self.request(&query).await {
                Ok(text) => {
                    info!(model = %self.model, chars = text.len(), "AI call success");
                    AiResponse::answer(text)
                }
                Err(e) => {
                    warn!(model = %self.model, prompt = %query.prompt, error = %e, "AI request failed");
                    AiResponse::failed(e.to_string())
                }
            }
        }
        .boxed()
    }
}

fn build_request_body(model: &str, query: &AiQuery) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &query.system_prompt {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": query.prompt }));

    serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": query.max_tokens,
        "temperature": TEMPERATURE,
    })
}

fn extract_content(json: &serde_json::Value) -> anyhow::Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("response has no message content"))
}
