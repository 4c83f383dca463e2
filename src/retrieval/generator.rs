//! The generative language model client used by the GENERATE state and by
//! the router's LLM-fallback classifier.
//!
//! OpenAI-compatible `/v1/chat/completions` request shape, with manual SSE
//! byte-stream parsing (`data: {...}\n\n`, sentinel `[DONE]`) since
//! `reqwest` has no built-in SSE client. The non-streaming `classify` path
//! reuses the same request struct with `stream: false`.

use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<NonStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct NonStreamChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

pub struct Generator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl Generator {
    pub fn new(base_url: String, model: String, api_key: Option<String>, temperature: f32, timeout_ms: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            model,
            api_key,
            temperature,
        }
    }

    /// A short, non-streaming completion used by the router's LLM fallback
    /// classifier. Temperature is pinned low regardless of
    /// the configured generation temperature, since this call wants a
    /// single deterministic-ish label token, not prose.
    pub async fn classify(&self, system_prompt: &str, query: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: query.to_string(),
                },
            ],
            temperature: 0.0,
            stream: false,
        };

        let response = self
            .authorized(self.client.post(self.endpoint()))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::RouteClassifierFailed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::RouteClassifierFailed(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::RouteClassifierFailed(format!("invalid response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| CoreError::RouteClassifierFailed("empty classifier response".to_string()))
    }

    /// Streams completion deltas for the GENERATE state.
    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> impl Stream<Item = Result<String>> + Send + 'static {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            stream: true,
        };
        let client = self.client.clone();
        let endpoint = self.endpoint();
        let api_key = self.api_key.clone();

        try_stream! {
            let mut request_builder = client.post(&endpoint).json(&request);
            if let Some(key) = &api_key {
                request_builder = request_builder.header("Authorization", format!("Bearer {key}"));
            }

            let response = request_builder
                .send()
                .await
                .map_err(|e| CoreError::GenerationUnavailable(format!("request failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Err(CoreError::GenerationUnavailable(format!("{status}: {body}")))?;
            }

            use futures::StreamExt;
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = chunk.map_err(|e| CoreError::GenerationInterrupted(format!("stream error: {e}")))?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event.lines() {
                        let Some(json_str) = line.strip_prefix("data: ") else { continue };
                        if json_str == "[DONE]" {
                            continue;
                        }
                        if let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(json_str) {
                            if let Some(content) = parsed.choices.first().and_then(|c| c.delta.content.clone()) {
                                if !content.is_empty() {
                                    yield content;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}
