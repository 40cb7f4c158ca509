//! voxchat backends
//!
//! Implementations of the `voxchat-core` collaborator traits:
//! - [`OpenAiClient`] / [`GeminiClient`]: streaming chat completions over SSE
//! - [`VoicevoxClient`]: VOICEVOX engine text-to-speech
//! - [`CommandAudioSink`]: temp WAV files played by an external command
//! - [`PromptLog`] and [`load_prompt_file`]: prompt history and prompt files
//!
//! Backends are picked at startup from the config file with
//! [`build_llm_client`] and [`build_tts_client`].

#![warn(clippy::all)]

mod http;

pub mod fixed;
pub mod gemini;
pub mod openai;
pub mod player;
pub mod prompt_log;
pub mod prompts;
pub mod sse;
pub mod voicevox;

pub use fixed::FixedReplyClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use player::{apply_fade, CommandAudioSink};
pub use prompt_log::PromptLog;
pub use prompts::{build_prompt, load_prompt_file};
pub use sse::{chunk_stream, SseDecoder, SseEvent};
pub use voicevox::{VoiceEntry, VoicevoxClient};

use std::sync::Arc;
use voxchat_core::{LlmBackend, LlmClient, LlmSettings, Result, TtsBackend, TtsClient, TtsSettings};

/// Create the LLM client named by the `llm` config section
pub fn build_llm_client(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match settings.backend {
        LlmBackend::OpenAi => Arc::new(OpenAiClient::new(settings)?),
        LlmBackend::Gemini => Arc::new(GeminiClient::new(settings)?),
    };
    tracing::info!(
        backend = client.name(),
        model = client.model(),
        "LLM backend ready"
    );
    Ok(client)
}

/// Create the TTS client named by the `tts` config section
pub fn build_tts_client(settings: &TtsSettings) -> Result<Arc<dyn TtsClient>> {
    let client: Arc<dyn TtsClient> = match settings.backend {
        TtsBackend::Voicevox => Arc::new(VoicevoxClient::new(settings)?),
    };
    tracing::info!(backend = client.name(), endpoint = %settings.endpoint, "TTS backend ready");
    Ok(client)
}
