//! Collaborator traits for the speech pipeline
//!
//! The pipeline only talks to the outside world through these traits:
//! - [`LlmClient`] streams a chat completion as raw JSON chunks
//! - [`TtsClient`] turns one segment of text into encoded audio
//! - [`AudioSink`] persists audio to a playable handle and plays it
//!
//! Concrete HTTP / process backends live in the `voxchat-backends` crate.

use crate::config::{LlmConfig, VoiceConfig};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the chat prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One streamed fragment as delivered by the LLM backend
///
/// The payload is kept as raw JSON; [`LlmClient::extract_text`] knows the
/// backend's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmChunk(pub serde_json::Value);

impl LlmChunk {
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Stream of LLM chunks for one request
pub type ChunkStream = BoxStream<'static, Result<LlmChunk>>;

/// Streaming chat-completion backend
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend name used in logs ("openai", "gemini", ...)
    fn name(&self) -> &str;

    /// Model identifier used in logs
    fn model(&self) -> &str;

    /// Start a streamed completion for `prompt`
    ///
    /// Errors returned here mean nothing was generated; errors inside the
    /// stream mean generation broke off mid-way.
    async fn stream_chat(&self, prompt: &[ChatMessage], config: &LlmConfig)
        -> Result<ChunkStream>;

    /// Text carried by one chunk; empty when the chunk carries none
    fn extract_text(&self, chunk: &LlmChunk) -> String;
}

/// Text-to-speech backend
#[async_trait]
pub trait TtsClient: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize one segment into encoded audio (WAV for the bundled backends)
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>>;

    /// Human readable name of a speaker id, if the backend knows it
    async fn speaker_name(&self, _speaker_id: u32) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Playable audio on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    path: PathBuf,
    temporary: bool,
}

impl AudioHandle {
    /// Audio written for a single playback; the sink removes it afterwards
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: true,
        }
    }

    /// Pre-recorded audio that must outlive playback (filler clips)
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

/// Clip owned by a playback job
///
/// A temporary clip is removed from disk when the guard drops, so audio
/// synthesized for a job that never plays (abandoned or dropped queue) or
/// whose playback was aborted does not outlive the job.
#[derive(Debug)]
pub struct ClipGuard {
    handle: AudioHandle,
}

impl ClipGuard {
    pub fn new(handle: AudioHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &AudioHandle {
        &self.handle
    }
}

impl Drop for ClipGuard {
    fn drop(&mut self) {
        if !self.handle.is_temporary() {
            return;
        }
        match std::fs::remove_file(self.handle.path()) {
            Ok(()) => tracing::debug!(path = %self.handle.path().display(), "removed unplayed clip"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(
                path = %self.handle.path().display(),
                "Failed to remove clip: {}",
                e
            ),
        }
    }
}

/// Audio output
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Persist synthesized audio so it can be played later
    async fn write_temp_audio(&self, audio: Vec<u8>) -> Result<AudioHandle>;

    /// Play the audio; resolves when playback has ended
    async fn play(&self, handle: AudioHandle) -> Result<()>;
}
