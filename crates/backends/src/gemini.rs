//! Google Gemini backend
//!
//! Streams `POST {base}/v1beta/models/{model}:streamGenerateContent?alt=sse`.
//! System messages are folded into `systemInstruction`; assistant turns use
//! the `model` role.

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
    ChatMessage, ChunkStream, Error, LlmChunk, LlmClient, LlmConfig, LlmSettings, Result, Role,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_GEMINI_API_KEY";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Request body for :streamGenerateContent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig,
}

fn request_body<'a>(prompt: &'a [ChatMessage], config: &LlmConfig) -> GenerateContentRequest<'a> {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for message in prompt {
        let part = Part {
            text: &message.content,
        };
        match message.role {
            Role::System => system.push(part),
            Role::User => contents.push(Content {
                role: "user",
                parts: vec![part],
            }),
            Role::Assistant => contents.push(Content {
                role: "model",
                parts: vec![part],
            }),
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction: (!system.is_empty()).then_some(SystemInstruction { parts: system }),
        generation_config: GenerationConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

/// Text of a streamed candidate: every `candidates[0].content.parts[*].text`
pub fn chunk_text(payload: &serde_json::Value) -> String {
    payload
        .pointer("/candidates/0/content/parts")
        .and_then(|parts| parts.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

/// Streaming Gemini client
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    model: String,
    /// Connect and response-head timeout; the streamed body is unbounded
    timeout: Duration,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client from the `llm` config section
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env` (`GOOGLE_GEMINI_API_KEY` by default).
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

    fn stream_url(&self, model: &str) -> String {
        endpoint(
            &self.base_url,
            &format!("/v1beta/models/{}:streamGenerateContent?alt=sse", model),
        )
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, prompt: &[ChatMessage], config: &LlmConfig) -> Result<ChunkStream> {
        let url = self.stream_url(&config.model);
        tracing::debug!(url = %url, messages = prompt.len(), "opening chat stream");

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, config));
        let response = send_streaming(request, self.timeout).await?;

        if !response.status().is_success() {
            return Err(Error::Generation(describe_failure(response).await));
        }

        Ok(chunk_stream(response.bytes_stream(), "gemini"))
    }

    fn extract_text(&self, chunk: &LlmChunk) -> String {
        chunk_text(chunk.payload())
    }
}
