//! voxchat core - streaming LLM to speech pipelining engine
//!
//! Turns a token-by-token LLM reply into gapless, strictly ordered speech
//! while the reply is still being generated.
//!
//! # Architecture
//!
//! - [`segmenter`] cuts the streamed text into speakable segments
//! - [`playback`] runs one synthesis + playback job per segment, in order,
//!   with at most one job audible at a time
//! - [`orchestrator`] drives a chat turn end to end
//!
//! External systems (LLM, TTS, audio output) sit behind the traits in
//! [`backend`]; HTTP and process implementations live in
//! `voxchat-backends`.
//!
//! # Example
//!
//! ```ignore
//! use voxchat_core::{BotConfig, ChatMessage, SpeechPipeline};
//!
//! let config = BotConfig::from_file("voxchat.yaml")?;
//! let pipeline = SpeechPipeline::new(llm, tts, sink);
//! let report = pipeline
//!     .run_turn(&[ChatMessage::user("こんにちは")], &config.turn_config())
//!     .await?;
//! println!("{}", report.transcript);
//! ```

#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod playback;
pub mod segmenter;

pub use backend::{
    AudioHandle, AudioSink, ChatMessage, ChunkStream, ClipGuard, LlmChunk, LlmClient, Role,
    TtsClient,
};
pub use config::{
    AudioSettings, BotConfig, FillerConfig, LlmBackend, LlmConfig, LlmSettings, PromptSettings,
    SpeechSettings, TtsBackend, TtsSettings, TurnConfig, VoiceConfig,
};
pub use error::{Error, Result};
pub use events::{TracingTurnLogger, TurnLogger, TurnStart};
pub use orchestrator::{SpeechPipeline, TurnReport, TurnState, TurnTimings};
pub use playback::{JobStatus, PlaybackJob, PlaybackQueue};
pub use segmenter::{split_text, LetterClass, Segmenter, SegmenterConfig, WordMarks};
