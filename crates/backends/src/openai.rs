//! OpenAI chat completions backend
//!
//! Streams `POST {base}/v1/chat/completions` with `stream: true`. Each SSE
//! `data:` payload becomes one [`LlmChunk`]; `data: [DONE]` ends the stream.
//! Any server speaking the same protocol can be used through `base_url`.

use crate::http::{
    api_key_from_env, build_streaming_client, describe_failure, endpoint, parse_base_url,
    send_streaming,
};
use crate::sse::chunk_stream;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;
use voxchat_core::{
    ChatMessage, ChunkStream, Error, LlmChunk, LlmClient, LlmConfig, LlmSettings, Result,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Request body for /v1/chat/completions
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Streaming OpenAI client
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    model: String,
    /// Connect and response-head timeout; the streamed body is unbounded
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client from the `llm` config section
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env` (`OPENAI_API_KEY` by default).
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let key_env = settings.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        Self::with_api_key(
            settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            api_key_from_env(key_env)?,
            &settings.generation.model,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn with_api_key(
        base_url: &str,
        api_key: impl Into<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_key: api_key.into(),
            model: model.to_string(),
            timeout,
            client: build_streaming_client(timeout)?,
        })
    }
}

fn request_body<'a>(prompt: &'a [ChatMessage], config: &'a LlmConfig) -> ChatCompletionRequest<'a> {
    if config.top_k.is_some() {
        tracing::debug!("top_k is not supported by the OpenAI API, ignoring");
    }
    ChatCompletionRequest {
        model: &config.model,
        messages: prompt,
        stream: true,
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_output_tokens,
    }
}

/// Text of a completion chunk
///
/// `choices[0].delta.content` for streamed chunks, `choices[0].message.content`
/// for a full response; empty when absent or null.
pub fn chunk_text(payload: &serde_json::Value) -> String {
    let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) else {
        return String::new();
    };
    choice
        .get("delta")
        .or_else(|| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, prompt: &[ChatMessage], config: &LlmConfig) -> Result<ChunkStream> {
        let url = endpoint(&self.base_url, "/v1/chat/completions");
        tracing::debug!(url = %url, model = %config.model, messages = prompt.len(), "opening chat stream");

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body(prompt, config));
        let response = send_streaming(request, self.timeout).await?;

        if !response.status().is_success() {
            return Err(Error::Generation(describe_failure(response).await));
        }

        Ok(chunk_stream(response.bytes_stream(), "openai"))
    }

    fn extract_text(&self, chunk: &LlmChunk) -> String {
        chunk_text(chunk.payload())
    }
}
