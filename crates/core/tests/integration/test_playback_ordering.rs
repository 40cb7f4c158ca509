//! Integration tests for playback queue ordering
//!
//! Drives `PlaybackQueue` through its public API the way the orchestrator
//! does (enqueue + advance + interval polling) and checks the event log:
//! no job starts before its predecessor finished, whatever the timing.

mod fixtures;

use fixtures::EventLog;
use rand::Rng;
use std::time::Duration;
use voxchat_core::{AudioHandle, ClipGuard, Error, JobStatus, PlaybackJob, PlaybackQueue, Result};

fn job(log: &EventLog, id: usize, prepare_ms: u64, play_ms: u64) -> PlaybackJob<usize> {
    let prepare_log = log.clone();
    let play_log = log.clone();
    PlaybackJob::new(
        format!("job {}", id),
        async move {
            prepare_log.push(format!("prepare {}", id));
            tokio::time::sleep(Duration::from_millis(prepare_ms)).await;
            Ok(id)
        },
        move |id| async move {
            play_log.push(format!("start {}", id));
            tokio::time::sleep(Duration::from_millis(play_ms)).await;
            play_log.push(format!("end {}", id));
            Ok(())
        },
    )
}

async fn drain(queue: &mut PlaybackQueue<usize>) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(2));
    loop {
        queue.advance()?;
        if queue.is_drained() {
            return Ok(());
        }
        ticker.tick().await;
    }
}

#[tokio::test]
async fn test_random_timings_keep_strict_order() {
    let log = EventLog::default();
    let mut queue = PlaybackQueue::with_lookahead(2);
    let mut rng = rand::thread_rng();
    let timings: Vec<(u64, u64)> = (0..12)
        .map(|_| (rng.gen_range(0..8), rng.gen_range(0..8)))
        .collect();

    for (id, (prepare_ms, play_ms)) in timings.into_iter().enumerate() {
        queue.enqueue(job(&log, id, prepare_ms, play_ms));
    }
    drain(&mut queue).await.unwrap();

    let expected: Vec<String> = (0..12)
        .flat_map(|id| [format!("start {}", id), format!("end {}", id)])
        .collect();
    assert_eq!(log.playback(), expected);
    assert_eq!(queue.statuses(), vec![JobStatus::Finish; 12]);
}

#[tokio::test]
async fn test_jobs_enqueued_while_playing_keep_order() {
    let log = EventLog::default();
    let mut queue = PlaybackQueue::new();

    queue.enqueue(job(&log, 0, 0, 15));
    queue.advance().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Arrives mid-playback with a faster clip
    queue.enqueue(job(&log, 1, 0, 1));
    queue.advance().unwrap();
    assert_eq!(queue.statuses()[1], JobStatus::BeforeStart);

    drain(&mut queue).await.unwrap();
    assert_eq!(log.playback(), vec!["start 0", "end 0", "start 1", "end 1"]);
}

#[tokio::test]
async fn test_second_synthesis_failure_stops_the_queue() {
    let log = EventLog::default();
    let mut queue = PlaybackQueue::new();

    queue.enqueue(job(&log, 1, 0, 20));
    let failing_log = log.clone();
    queue.enqueue(PlaybackJob::new(
        "job 2",
        async move {
            failing_log.push("prepare 2");
            Err::<usize, _>(Error::Synthesis("engine returned 500".to_string()))
        },
        |_| async { Ok(()) },
    ));
    queue.enqueue(job(&log, 3, 0, 1));

    let err = drain(&mut queue).await.unwrap_err();
    assert!(matches!(err, Error::Synthesis(ref m) if m == "engine returned 500"));

    assert_eq!(log.playback(), vec!["start 1", "end 1"]);
    assert!(log.contains("prepare 2"));
    assert!(!log.contains("prepare 3"));
    assert_eq!(
        queue.statuses(),
        vec![JobStatus::Finish, JobStatus::Failed, JobStatus::BeforeStart]
    );
    assert_eq!(queue.abandoned_by(), Some(1));
    assert!(matches!(
        queue.advance(),
        Err(Error::QueueAbandoned { failed_ordinal: 1 })
    ));
}

#[tokio::test]
async fn test_drained_only_after_tail_finishes() {
    let log = EventLog::default();
    let mut queue = PlaybackQueue::new();
    queue.enqueue(job(&log, 0, 0, 5));
    queue.enqueue(job(&log, 1, 0, 5));

    let mut seen_running_tail = false;
    loop {
        queue.advance().unwrap();
        let statuses = queue.statuses();
        let tail_done = statuses[1] == JobStatus::Finish;
        assert_eq!(queue.is_drained(), tail_done);
        if statuses[1] == JobStatus::Running {
            seen_running_tail = true;
        }
        if tail_done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(seen_running_tail);
    assert_eq!(queue.pending(), 0);
    assert_eq!(queue.label(1), Some("job 1"));
}

#[tokio::test]
async fn test_zero_lookahead_disables_prefetch() {
    let log = EventLog::default();
    let mut queue = PlaybackQueue::with_lookahead(0);
    queue.enqueue(job(&log, 0, 0, 10));
    queue.enqueue(job(&log, 1, 0, 0));

    drain(&mut queue).await.unwrap();

    let end_0 = log.position("end 0").unwrap();
    let prepare_1 = log.position("prepare 1").unwrap();
    assert!(end_0 < prepare_1, "{:?}", log.snapshot());
}

#[tokio::test]
async fn test_abandoned_queue_leaves_no_temp_clips() {
    let dir = tempfile::tempdir().unwrap();
    let clip_path = |name: &str| dir.path().join(format!("{}.wav", name));
    let mut queue: PlaybackQueue<ClipGuard> = PlaybackQueue::with_lookahead(2);

    let first = clip_path("first");
    std::fs::write(&first, b"RIFF").unwrap();
    queue.enqueue(PlaybackJob::ready(
        "first",
        ClipGuard::new(AudioHandle::temporary(&first)),
        |clip: ClipGuard| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(clip);
            Err::<(), _>(Error::Playback("device lost".to_string()))
        },
    ));
    // Synthesized while "first" plays, never started
    for name in ["second", "third"] {
        let path = clip_path(name);
        queue.enqueue(PlaybackJob::new(
            name,
            async move {
                tokio::fs::write(&path, b"RIFF").await?;
                Ok::<_, Error>(ClipGuard::new(AudioHandle::temporary(path)))
            },
            |_clip: ClipGuard| async { Ok::<(), Error>(()) },
        ));
    }

    let err = loop {
        if let Err(e) = queue.advance() {
            break e;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    assert!(matches!(err, Error::Playback(ref m) if m == "device lost"));

    // Aborted units drop their clips once the runtime cancels them
    tokio::time::sleep(Duration::from_millis(20)).await;
    for name in ["first", "second", "third"] {
        assert!(!clip_path(name).exists(), "{} left on disk", name);
    }
}
