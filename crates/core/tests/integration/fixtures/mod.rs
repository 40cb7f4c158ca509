//! Fake collaborators for pipeline tests
//!
//! Every fake writes into a shared [`EventLog`] so tests can assert the
//! relative order of synthesis and playback.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxchat_core::{
    AudioHandle, AudioSink, ChatMessage, ChunkStream, Error, LlmChunk, LlmClient, LlmConfig,
    Result, SpeechPipeline, TtsClient, TurnConfig, TurnLogger, TurnStart, VoiceConfig,
};

/// Ordered record of everything the fakes observed
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }

    /// Playback events only (`start ...` / `end ...`)
    pub fn playback(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.starts_with("start ") || e.starts_with("end "))
            .collect()
    }
}

enum Step {
    Text(String),
    /// Chunk without text (role header, usage block)
    Empty,
    Fail(String),
    /// Silence on the stream before the next step
    Stall(Duration),
}

/// LLM that replays a fixed list of fragments
pub struct ScriptedLlm {
    steps: Vec<Step>,
    fail_on_open: Option<String>,
    chunk_delay: Duration,
}

impl ScriptedLlm {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            steps: fragments.iter().map(|f| Step::Text(f.to_string())).collect(),
            fail_on_open: None,
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn failing_after(fragments: &[&str], message: &str) -> Self {
        let mut llm = Self::new(fragments);
        llm.steps.push(Step::Fail(message.to_string()));
        llm
    }

    pub fn failing_on_open(message: &str) -> Self {
        Self {
            steps: Vec::new(),
            fail_on_open: Some(message.to_string()),
            chunk_delay: Duration::ZERO,
        }
    }

    /// `before`, then `stall` of silence, then `after`
    pub fn stalling(before: &[&str], stall: Duration, after: &[&str]) -> Self {
        let mut llm = Self::new(before);
        llm.steps.push(Step::Stall(stall));
        llm.steps
            .extend(after.iter().map(|f| Step::Text(f.to_string())));
        llm
    }

    pub fn with_empty_chunk(mut self) -> Self {
        self.steps.insert(0, Step::Empty);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "script-1"
    }

    async fn stream_chat(
        &self,
        _prompt: &[ChatMessage],
        _config: &LlmConfig,
    ) -> Result<ChunkStream> {
        if let Some(message) = &self.fail_on_open {
            return Err(Error::Generation(message.clone()));
        }

        let delay = self.chunk_delay;
        let items: Vec<(Duration, Option<Result<LlmChunk>>)> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Text(text) => (delay, Some(Ok(LlmChunk(json!({ "text": text }))))),
                Step::Empty => (delay, Some(Ok(LlmChunk(json!({ "role": "assistant" }))))),
                Step::Fail(message) => (delay, Some(Err(Error::Generation(message.clone())))),
                Step::Stall(stall) => (*stall, None),
            })
            .collect();

        Ok(futures::stream::iter(items)
            .then(|(wait, item)| async move {
                tokio::time::sleep(wait).await;
                item
            })
            .filter_map(futures::future::ready)
            .boxed())
    }

    fn extract_text(&self, chunk: &LlmChunk) -> String {
        chunk
            .payload()
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

/// TTS that "encodes" the text as its own bytes
pub struct FakeTts {
    log: EventLog,
    failing: HashSet<String>,
    delay: Duration,
}

impl FakeTts {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TtsClient for FakeTts {
    fn name(&self) -> &str {
        "fake-tts"
    }

    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>> {
        self.log.push(format!("synth {}", text));
        tokio::time::sleep(self.delay).await;
        if self.failing.contains(text) {
            return Err(Error::Synthesis(format!("cannot synthesize {:?}", text)));
        }
        Ok(text.as_bytes().to_vec())
    }

    async fn speaker_name(&self, speaker_id: u32) -> Result<Option<String>> {
        Ok(Some(format!("speaker {}", speaker_id)))
    }
}

/// Sink that keeps clips in memory and logs playback start/end
pub struct FakeSink {
    log: EventLog,
    play_time: Duration,
    clips: Mutex<HashMap<PathBuf, String>>,
    next_clip: AtomicUsize,
}

impl FakeSink {
    pub fn new(log: &EventLog, play_time: Duration) -> Self {
        Self {
            log: log.clone(),
            play_time,
            clips: Mutex::new(HashMap::new()),
            next_clip: AtomicUsize::new(0),
        }
    }

    /// Clips written but not yet played
    pub fn unplayed(&self) -> usize {
        self.clips.lock().unwrap().len()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn write_temp_audio(&self, audio: Vec<u8>) -> Result<AudioHandle> {
        let n = self.next_clip.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!("/fake/{}.wav", n));
        let text = String::from_utf8(audio).map_err(|e| Error::Other(e.to_string()))?;
        self.clips.lock().unwrap().insert(path.clone(), text);
        Ok(AudioHandle::temporary(path))
    }

    async fn play(&self, handle: AudioHandle) -> Result<()> {
        let label = if handle.is_temporary() {
            self.clips
                .lock()
                .unwrap()
                .remove(handle.path())
                .unwrap_or_else(|| "?".to_string())
        } else {
            handle
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        self.log.push(format!("start {}", label));
        tokio::time::sleep(self.play_time).await;
        self.log.push(format!("end {}", label));
        Ok(())
    }
}

/// Turn logger recording event names
#[derive(Clone, Default)]
pub struct RecordingLogger {
    pub events: EventLog,
}

impl TurnLogger for RecordingLogger {
    fn turn_started(&self, turn: &TurnStart<'_>) {
        self.events.push(format!("turn_started {} {}", turn.llm, turn.model));
    }

    fn first_segment(&self, _latency: Duration) {
        self.events.push("first_segment");
    }

    fn segment_queued(&self, ordinal: usize, text: &str) {
        self.events.push(format!("segment_queued {} {}", ordinal, text));
    }

    fn filler_queued(&self, word: &str) {
        self.events.push(format!("filler_queued {}", word));
    }

    fn generation_finished(&self, _elapsed: Duration, chars: usize) {
        self.events.push(format!("generation_finished {}", chars));
    }

    fn speech_finished(&self, _first_segment: Duration, _total: Duration) {
        self.events.push("speech_finished");
    }

    fn turn_finished(&self, _transcript: &str) {
        self.events.push("turn_finished");
    }

    fn turn_failed(&self, error: &Error, partial_transcript: &str) {
        self.events
            .push(format!("turn_failed {} {}", error.kind(), partial_transcript));
    }
}

pub fn pipeline(
    llm: ScriptedLlm,
    tts: FakeTts,
    sink: Arc<FakeSink>,
    logger: &RecordingLogger,
) -> SpeechPipeline {
    SpeechPipeline::new(Arc::new(llm), Arc::new(tts), sink)
        .with_logger(Arc::new(logger.clone()))
}

/// Turn config with a short poll interval
pub fn fast_config() -> TurnConfig {
    TurnConfig {
        poll_interval: Duration::from_millis(5),
        ..TurnConfig::default()
    }
}

pub fn prompt() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a friendly voice bot."),
        ChatMessage::user("hello"),
    ]
}
