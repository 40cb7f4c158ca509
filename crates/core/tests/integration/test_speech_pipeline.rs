//! Integration tests for the speech pipeline
//!
//! Drives complete turns through `SpeechPipeline::run_turn` with scripted
//! LLM output and fake TTS / audio collaborators, checking:
//! 1. Segments are synthesized and played in reply order
//! 2. Failures propagate after earlier speech has finished
//! 3. Filler, text-only turns and backpressure

mod fixtures;

use fixtures::{fast_config, pipeline, prompt, EventLog, FakeSink, FakeTts, RecordingLogger, ScriptedLlm};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voxchat_core::{Error, FillerConfig, TurnConfig};

fn play(events: &[&str]) -> Vec<String> {
    events
        .iter()
        .flat_map(|e| [format!("start {}", e), format!("end {}", e)])
        .collect()
}

#[tokio::test]
async fn test_reply_is_spoken_segment_by_segment() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(10)));
    let pipeline = pipeline(
        ScriptedLlm::new(&["Hel", "lo. How ", "are you?"]).with_empty_chunk(),
        FakeTts::new(&log),
        sink.clone(),
        &logger,
    );

    let report = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap();

    assert_eq!(report.transcript, "Hello. How are you?");
    assert_eq!(report.segments, vec!["Hello.", "How are you?"]);
    assert_eq!(report.filler, None);
    assert_eq!(log.playback(), play(&["Hello.", "How are you?"]));
    assert_eq!(sink.unplayed(), 0);

    let timings = &report.timings;
    let first = timings.time_to_first_segment.unwrap();
    let total = timings.total_speech.unwrap();
    assert!(first <= timings.generation);
    assert!(timings.generation <= total);
    // Two clips of 10ms each played back to back
    assert!(total >= Duration::from_millis(20));

    assert_eq!(
        logger.events.snapshot(),
        vec![
            "turn_started scripted script-1",
            "first_segment",
            "segment_queued 0 Hello.",
            "generation_finished 19",
            "segment_queued 1 How are you?",
            "speech_finished",
            "turn_finished",
        ]
    );
}

#[tokio::test]
async fn test_ready_clips_play_while_the_stream_stalls() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(20)));
    let pipeline = pipeline(
        ScriptedLlm::stalling(&["One. Two. Three "], Duration::from_millis(300), &["end."]),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let report = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap();

    assert_eq!(report.segments, vec!["One.", "Two.", "Three end."]);
    assert_eq!(log.playback(), play(&["One.", "Two.", "Three end."]));
    // Both clips synthesized before the stall finish before the stream resumes
    let end_two = log.position("end Two.").unwrap();
    let synth_last = log.position("synth Three end.").unwrap();
    assert!(end_two < synth_last, "{:?}", log.snapshot());
}

#[tokio::test]
async fn test_synthesis_failure_stops_later_jobs() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(20)));
    let pipeline = pipeline(
        ScriptedLlm::new(&["One. Two. Three."]),
        FakeTts::new(&log).failing_on("Two."),
        sink,
        &logger,
    );

    let err = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap_err();

    assert!(matches!(err, Error::Synthesis(ref m) if m.contains("Two.")));
    // Job 1 played in full, job 2 failed, job 3 never started
    assert_eq!(log.playback(), play(&["One."]));
    assert!(!log.contains("start Three."));
    assert!(!log.contains("synth Three."));
    assert!(logger
        .events
        .contains("turn_failed synthesis One. Two. Three."));
}

#[tokio::test]
async fn test_generation_failure_mid_stream_drains_queued_speech() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(10)));
    let pipeline = pipeline(
        ScriptedLlm::failing_after(&["First. ", "Second. Thi"], "connection reset"),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let err = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap_err();

    assert!(matches!(err, Error::Generation(ref m) if m == "connection reset"));
    // Both confirmed segments finished before the error surfaced
    assert_eq!(log.playback(), play(&["First.", "Second."]));
    assert!(!log.contains("synth Thi"));
    assert!(logger
        .events
        .contains("turn_failed generation First. Second. Thi"));
    assert!(!logger.events.contains("turn_finished"));
}

#[tokio::test]
async fn test_generation_failure_before_any_text() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::ZERO));
    let pipeline = pipeline(
        ScriptedLlm::failing_on_open("401 Unauthorized"),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let err = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap_err();

    assert!(matches!(err, Error::Generation(_)));
    assert!(log.snapshot().is_empty());
    assert!(logger.events.contains("turn_failed generation "));
}

#[tokio::test]
async fn test_filler_plays_before_first_segment() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(5)));
    let pipeline = pipeline(
        ScriptedLlm::new(&["それはね。", "秘密です。"]).with_chunk_delay(Duration::from_millis(5)),
        FakeTts::new(&log).with_delay(Duration::from_millis(5)),
        sink,
        &logger,
    );

    let config = TurnConfig {
        filler: FillerConfig {
            enabled: true,
            dir: PathBuf::from("/voice/filler"),
            words: vec!["うむ".to_string()],
            probability: Some(1.0),
        },
        ..fast_config()
    };

    let report = pipeline.run_turn(&prompt(), &config).await.unwrap();

    assert_eq!(report.filler.as_deref(), Some("うむ"));
    assert_eq!(report.segments, vec!["それはね。", "秘密です。"]);
    assert_eq!(log.playback(), play(&["うむ", "それはね。", "秘密です。"]));
    assert!(logger.events.contains("filler_queued うむ"));
    // Filler is not a segment: ordinals start after it
    assert!(logger.events.contains("segment_queued 1 それはね。"));
}

#[tokio::test]
async fn test_filler_disabled_by_zero_probability() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::ZERO));
    let pipeline = pipeline(ScriptedLlm::new(&["Hi."]), FakeTts::new(&log), sink, &logger);

    let config = TurnConfig {
        filler: FillerConfig {
            enabled: true,
            probability: Some(0.0),
            ..FillerConfig::default()
        },
        ..fast_config()
    };

    let report = pipeline.run_turn(&prompt(), &config).await.unwrap();
    assert_eq!(report.filler, None);
    assert_eq!(log.playback(), play(&["Hi."]));
}

#[tokio::test]
async fn test_text_only_turn_skips_speech() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::ZERO));
    let pipeline = pipeline(
        ScriptedLlm::new(&["Just ", "text. ", "No voice."]),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let report = pipeline
        .run_turn(&prompt(), &fast_config().text_only())
        .await
        .unwrap();

    assert_eq!(report.transcript, "Just text. No voice.");
    assert!(report.segments.is_empty());
    assert_eq!(report.timings.time_to_first_segment, None);
    assert_eq!(report.timings.total_speech, None);
    assert!(log.snapshot().is_empty());
    assert!(logger.events.contains("turn_finished"));
}

#[tokio::test]
async fn test_empty_reply_speaks_nothing() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::ZERO));
    let pipeline = pipeline(ScriptedLlm::new(&["", "  \n"]), FakeTts::new(&log), sink, &logger);

    let report = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap();

    assert!(report.segments.is_empty());
    assert_eq!(report.timings.total_speech, None);
    assert!(log.snapshot().is_empty());
    assert!(!logger.events.contains("speech_finished"));
}

#[tokio::test]
async fn test_backpressure_waits_for_playback() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::from_millis(5)));
    let pipeline = pipeline(
        ScriptedLlm::new(&["A. B. C. D. E."]),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let config = TurnConfig {
        max_pending_jobs: 1,
        ..fast_config()
    };
    let report = pipeline.run_turn(&prompt(), &config).await.unwrap();

    let segments = ["A.", "B.", "C.", "D.", "E."];
    assert_eq!(report.segments, segments);
    assert_eq!(log.playback(), play(&segments));

    // With one pending job allowed, segment k is only synthesized after k-1 ended
    for pair in segments.windows(2) {
        let ended = log.position(&format!("end {}", pair[0])).unwrap();
        let synthesized = log.position(&format!("synth {}", pair[1])).unwrap();
        assert!(ended < synthesized, "{:?}", log.snapshot());
    }
}

#[tokio::test]
async fn test_turns_do_not_share_state() {
    let log = EventLog::default();
    let logger = RecordingLogger::default();
    let sink = Arc::new(FakeSink::new(&log, Duration::ZERO));
    let pipeline = pipeline(
        ScriptedLlm::new(&["Same. Reply"]),
        FakeTts::new(&log),
        sink,
        &logger,
    );

    let first = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap();
    let second = pipeline.run_turn(&prompt(), &fast_config()).await.unwrap();

    assert_eq!(first.segments, vec!["Same.", "Reply"]);
    assert_eq!(second.segments, first.segments);
    assert_eq!(log.playback(), play(&["Same.", "Reply", "Same.", "Reply"]));
}
