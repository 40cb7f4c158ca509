//! Speech Pipeline Orchestrator
//!
//! Runs one chat turn: streams the LLM reply, cuts it into speakable
//! segments, and pipelines synthesis + playback of each segment while the
//! rest of the reply is still being generated.
//!
//! ```text
//! Idle -> Generating -> Draining -> Idle
//!            |   LLM chunk -> Segmenter -> PlaybackQueue::enqueue + advance
//!            |   poll interval elapsed -> advance
//!            |   stream end -> flush segmenter
//!            \-> Draining: advance every poll interval until drained
//! ```

use crate::backend::{AudioHandle, AudioSink, ChatMessage, ClipGuard, LlmClient, TtsClient};
use crate::config::{TurnConfig, VoiceConfig};
use crate::events::{TracingTurnLogger, TurnLogger, TurnStart};
use crate::playback::{PlaybackJob, PlaybackQueue};
use crate::segmenter::Segmenter;
use crate::{Error, Result};
use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// LLM stream open; segments are synthesized and played as they appear
    Generating,
    /// Stream ended; waiting for queued playback
    Draining,
}

/// Latency measurements of one turn, relative to the turn start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnTimings {
    /// First real segment queued (filler excluded)
    pub time_to_first_segment: Option<Duration>,
    /// LLM stream ended
    pub generation: Duration,
    /// Playback queue drained; `None` when nothing was spoken
    pub total_speech: Option<Duration>,
}

/// Outcome of a successful turn
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// Full generated text
    pub transcript: String,
    /// Speakable segments in play order
    pub segments: Vec<String>,
    /// Filler word played before the first segment
    pub filler: Option<String>,
    pub timings: TurnTimings,
}

/// Streaming LLM to speech pipeline
pub struct SpeechPipeline {
    llm: Arc<dyn LlmClient>,
    tts: Arc<dyn TtsClient>,
    sink: Arc<dyn AudioSink>,
    logger: Arc<dyn TurnLogger>,
}

impl SpeechPipeline {
    pub fn new(llm: Arc<dyn LlmClient>, tts: Arc<dyn TtsClient>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            llm,
            tts,
            sink,
            logger: Arc::new(TracingTurnLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TurnLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn tts(&self) -> &Arc<dyn TtsClient> {
        &self.tts
    }

    /// Run one chat turn to completion
    ///
    /// Returns once the reply has been generated and every queued segment
    /// has finished playing. Failures are reported to the turn logger with
    /// the partial transcript before they are returned.
    pub async fn run_turn(&self, prompt: &[ChatMessage], config: &TurnConfig) -> Result<TurnReport> {
        let mut turn = Turn::new(self, config);
        match turn.run(prompt).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.logger.turn_failed(&e, &turn.transcript);
                Err(e)
            }
        }
    }
}

/// State of a single in-flight turn
struct Turn<'a> {
    pipeline: &'a SpeechPipeline,
    config: &'a TurnConfig,
    state: TurnState,
    started: Instant,
    transcript: String,
    segments: Vec<String>,
    filler: Option<String>,
    first_segment: Option<Duration>,
}

impl<'a> Turn<'a> {
    fn new(pipeline: &'a SpeechPipeline, config: &'a TurnConfig) -> Self {
        Self {
            pipeline,
            config,
            state: TurnState::Idle,
            started: Instant::now(),
            transcript: String::new(),
            segments: Vec::new(),
            filler: None,
            first_segment: None,
        }
    }

    async fn run(&mut self, prompt: &[ChatMessage]) -> Result<TurnReport> {
        let pipeline = self.pipeline;
        pipeline.logger.turn_started(&TurnStart {
            llm: pipeline.llm.name(),
            model: pipeline.llm.model(),
            tts: pipeline.tts.name(),
            speaker_id: self.config.voice.as_ref().map(|v| v.speaker_id),
            prompt_messages: prompt.len(),
        });
        self.transition(TurnState::Generating);

        let Some(voice) = self.config.voice.clone() else {
            return self.run_text_only(prompt).await;
        };

        let mut stream = pipeline.llm.stream_chat(prompt, &self.config.llm).await?;
        let mut queue = PlaybackQueue::with_lookahead(self.config.synthesis_lookahead);
        let mut segmenter = Segmenter::new(self.config.segmenter.clone());

        self.enqueue_filler(&mut queue)?;

        // Tick between chunks too, so a ready clip never waits on a stalled stream
        let mut ticker = poll_ticker(self.config.poll_interval);
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = ticker.tick() => {
                    queue.advance()?;
                    continue;
                }
            };
            let Some(next) = next else {
                break;
            };
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.abort_generation(&mut queue, e).await),
            };

            let text = pipeline.llm.extract_text(&chunk);
            if !text.is_empty() {
                self.transcript.push_str(&text);
                for segment in segmenter.push_str(&text) {
                    self.enqueue_segment(&mut queue, segment, &voice).await?;
                }
            }
            queue.advance()?;
        }

        let generation = self.started.elapsed();
        pipeline
            .logger
            .generation_finished(generation, self.transcript.chars().count());

        if let Some(segment) = segmenter.finish() {
            self.enqueue_segment(&mut queue, segment, &voice).await?;
        }

        self.transition(TurnState::Draining);
        let total_speech = if queue.is_empty() {
            None
        } else {
            drain(&mut queue, self.config.poll_interval).await?;
            Some(self.started.elapsed())
        };

        if let (Some(first), Some(total)) = (self.first_segment, total_speech) {
            pipeline.logger.speech_finished(first, total);
        }

        Ok(self.finish(generation, total_speech))
    }

    /// No voice output: consume the stream for its text only
    async fn run_text_only(&mut self, prompt: &[ChatMessage]) -> Result<TurnReport> {
        let pipeline = self.pipeline;
        let mut stream = pipeline.llm.stream_chat(prompt, &self.config.llm).await?;
        while let Some(next) = stream.next().await {
            let chunk = next?;
            self.transcript.push_str(&pipeline.llm.extract_text(&chunk));
        }

        let generation = self.started.elapsed();
        pipeline
            .logger
            .generation_finished(generation, self.transcript.chars().count());
        Ok(self.finish(generation, None))
    }

    fn finish(&mut self, generation: Duration, total_speech: Option<Duration>) -> TurnReport {
        self.transition(TurnState::Idle);
        self.pipeline.logger.turn_finished(&self.transcript);
        TurnReport {
            transcript: std::mem::take(&mut self.transcript),
            segments: std::mem::take(&mut self.segments),
            filler: self.filler.take(),
            timings: TurnTimings {
                time_to_first_segment: self.first_segment,
                generation,
                total_speech,
            },
        }
    }

    /// Queue a pre-recorded filler ahead of the first real segment
    fn enqueue_filler(&mut self, queue: &mut PlaybackQueue<ClipGuard>) -> Result<()> {
        let filler = &self.config.filler;
        if !filler.enabled || filler.words.is_empty() {
            return Ok(());
        }

        let mut rng = rand::thread_rng();
        if !rng.gen_bool(filler.effective_probability()) {
            return Ok(());
        }
        let Some(word) = filler.words.choose(&mut rng) else {
            return Ok(());
        };

        let sink = Arc::clone(&self.pipeline.sink);
        let clip = ClipGuard::new(AudioHandle::persistent(filler.clip_path(word)));
        queue.enqueue(PlaybackJob::ready(
            format!("filler:{}", word),
            clip,
            move |clip| play_clip(sink, clip),
        ));
        self.pipeline.logger.filler_queued(word);
        self.filler = Some(word.clone());
        queue.advance()
    }

    async fn enqueue_segment(
        &mut self,
        queue: &mut PlaybackQueue<ClipGuard>,
        segment: String,
        voice: &VoiceConfig,
    ) -> Result<()> {
        while queue.pending() >= self.config.max_pending_jobs {
            tokio::time::sleep(self.config.poll_interval).await;
            queue.advance()?;
        }

        if self.first_segment.is_none() {
            let latency = self.started.elapsed();
            self.first_segment = Some(latency);
            self.pipeline.logger.first_segment(latency);
        }

        let tts = Arc::clone(&self.pipeline.tts);
        let writer = Arc::clone(&self.pipeline.sink);
        let player = Arc::clone(&self.pipeline.sink);
        let text = segment.clone();
        let voice = voice.clone();

        let ordinal = queue.enqueue(PlaybackJob::new(
            segment.clone(),
            async move {
                let audio = tts.synthesize(&text, &voice).await?;
                writer.write_temp_audio(audio).await.map(ClipGuard::new)
            },
            move |clip| play_clip(player, clip),
        ));
        self.pipeline.logger.segment_queued(ordinal, &segment);
        self.segments.push(segment);
        queue.advance()
    }

    /// Mid-stream generation failure: let queued speech finish, then fail
    async fn abort_generation(&mut self, queue: &mut PlaybackQueue<ClipGuard>, error: Error) -> Error {
        warn!(
            error = %error,
            queued = queue.len(),
            "generation failed mid-stream, draining queued speech"
        );
        self.transition(TurnState::Draining);
        if let Err(drain_error) = drain(queue, self.config.poll_interval).await {
            warn!(error = %drain_error, "playback failed while draining after generation error");
        }
        self.transition(TurnState::Idle);
        error
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }
}

/// Play a job's clip; the guard outlives playback so an aborted play still
/// cleans up
async fn play_clip(sink: Arc<dyn AudioSink>, clip: ClipGuard) -> Result<()> {
    let result = sink.play(clip.handle().clone()).await;
    drop(clip);
    result
}

/// Poll the queue on a fixed interval until the last job finished
async fn drain(queue: &mut PlaybackQueue<ClipGuard>, poll_interval: Duration) -> Result<()> {
    let mut ticker = poll_ticker(poll_interval);
    loop {
        queue.advance()?;
        if queue.is_drained() {
            return Ok(());
        }
        ticker.tick().await;
    }
}

fn poll_ticker(poll_interval: Duration) -> Interval {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
