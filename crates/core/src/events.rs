//! Turn event logging
//!
//! The pipeline reports progress through [`TurnLogger`]; reporting never
//! affects control flow. [`TracingTurnLogger`] writes each event as a
//! `tracing` event under the `voxchat::turn` target.

use crate::Error;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Context of a starting turn
#[derive(Debug, Clone)]
pub struct TurnStart<'a> {
    pub llm: &'a str,
    pub model: &'a str,
    pub tts: &'a str,
    /// `None` for text-only turns
    pub speaker_id: Option<u32>,
    pub prompt_messages: usize,
}

/// Fire-and-forget sink for turn events
pub trait TurnLogger: Send + Sync {
    fn turn_started(&self, _turn: &TurnStart<'_>) {}

    /// First real segment (filler excluded) was queued
    fn first_segment(&self, _latency: Duration) {}

    fn segment_queued(&self, _ordinal: usize, _text: &str) {}

    fn filler_queued(&self, _word: &str) {}

    /// LLM stream ended
    fn generation_finished(&self, _elapsed: Duration, _chars: usize) {}

    /// Playback queue drained
    fn speech_finished(&self, _first_segment: Duration, _total: Duration) {}

    fn turn_finished(&self, _transcript: &str) {}

    fn turn_failed(&self, _error: &Error, _partial_transcript: &str) {}
}

/// Default [`TurnLogger`] backed by `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTurnLogger;

impl TurnLogger for TracingTurnLogger {
    fn turn_started(&self, turn: &TurnStart<'_>) {
        info!(
            target: "voxchat::turn",
            llm = turn.llm,
            model = turn.model,
            tts = turn.tts,
            speaker_id = ?turn.speaker_id,
            prompt_messages = turn.prompt_messages,
            "turn started"
        );
    }

    fn first_segment(&self, latency: Duration) {
        info!(
            target: "voxchat::turn",
            speech_start_ms = latency.as_millis() as u64,
            "first segment queued"
        );
    }

    fn segment_queued(&self, ordinal: usize, text: &str) {
        debug!(target: "voxchat::turn", ordinal, segment = %text, "queued segment");
    }

    fn filler_queued(&self, word: &str) {
        debug!(target: "voxchat::turn", filler = %word, "queued filler");
    }

    fn generation_finished(&self, elapsed: Duration, chars: usize) {
        info!(
            target: "voxchat::turn",
            generation_ms = elapsed.as_millis() as u64,
            chars,
            "generation finished"
        );
    }

    fn speech_finished(&self, first_segment: Duration, total: Duration) {
        info!(
            target: "voxchat::turn",
            speech_start_ms = first_segment.as_millis() as u64,
            speech_finish_ms = total.as_millis() as u64,
            speech_ms = total.saturating_sub(first_segment).as_millis() as u64,
            "speech finished"
        );
    }

    fn turn_finished(&self, transcript: &str) {
        debug!(target: "voxchat::turn", transcript = %transcript, "turn finished");
    }

    fn turn_failed(&self, error: &Error, partial_transcript: &str) {
        warn!(
            target: "voxchat::turn",
            kind = error.kind(),
            error = %error,
            partial = %partial_transcript,
            "turn failed"
        );
    }
}
