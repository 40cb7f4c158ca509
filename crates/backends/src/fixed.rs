//! LLM stand-in replaying a fixed text
//!
//! Used by `voxchat speak` to measure segmentation, synthesis and playback
//! latency without a model: the text is streamed back in small fragments the
//! way a real model streams tokens.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use voxchat_core::{ChatMessage, ChunkStream, LlmChunk, LlmClient, LlmConfig, Result};

pub struct FixedReplyClient {
    text: String,
    fragment_chars: usize,
    fragment_delay: Duration,
}

impl FixedReplyClient {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fragment_chars: 3,
            fragment_delay: Duration::from_millis(20),
        }
    }

    /// Characters per streamed fragment and delay between fragments
    pub fn with_pacing(mut self, fragment_chars: usize, fragment_delay: Duration) -> Self {
        self.fragment_chars = fragment_chars.max(1);
        self.fragment_delay = fragment_delay;
        self
    }

    fn fragments(&self) -> Vec<String> {
        let chars: Vec<char> = self.text.chars().collect();
        chars
            .chunks(self.fragment_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl LlmClient for FixedReplyClient {
    fn name(&self) -> &str {
        "fixed"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn stream_chat(&self, _prompt: &[ChatMessage], _config: &LlmConfig) -> Result<ChunkStream> {
        let delay = self.fragment_delay;
        let chunks = self
            .fragments()
            .into_iter()
            .map(|text| -> Result<LlmChunk> { Ok(LlmChunk(serde_json::json!({ "text": text }))) });

        Ok(futures::stream::iter(chunks)
            .then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                chunk
            })
            .boxed())
    }

    fn extract_text(&self, chunk: &LlmChunk) -> String {
        chunk
            .payload()
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string()
    }
}
