//! Playback Queue Controller
//!
//! Ordered execution of playback jobs with at most one job audible at a time.
//!
//! Each job owns two halves:
//! - `prepare`: produces the playable clip (synthesis + temp file)
//! - `play`: consumes the clip and resolves when playback ended
//!
//! Both run inside one tokio task per job (the job's execution unit). The
//! unit awaits `prepare`, then blocks on a `oneshot` start signal that only
//! the controller sends, then runs `play`. That lets the controller
//! prefetch synthesis for the next `lookahead` jobs while the current one
//! is still playing, without ever starting playback out of order.
//!
//! The controller itself is a plain state machine driven by [`advance`]:
//!
//! ```text
//! BeforeStart --(first unfinished, start signal)--> Running --(unit ok)--> Finish
//!                                                        \--(unit err)--> Failed
//! ```
//!
//! A failed job abandons the queue: later jobs never start and every later
//! [`advance`] returns [`Error::QueueAbandoned`].
//!
//! [`advance`]: PlaybackQueue::advance

use crate::backend::AudioHandle;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of a playback job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued; synthesis may already be prefetching
    BeforeStart,
    /// Start signal sent, playback in progress
    Running,
    /// Execution unit completed successfully
    Finish,
    /// Execution unit failed; the queue is abandoned
    Failed,
}

type PlayFn<T> = Box<dyn FnOnce(T) -> BoxFuture<'static, Result<()>> + Send>;

/// One unit of work for the queue
pub struct PlaybackJob<T = AudioHandle> {
    label: String,
    prepare: BoxFuture<'static, Result<T>>,
    play: PlayFn<T>,
}

impl<T: Send + 'static> PlaybackJob<T> {
    pub fn new<P, F, Fut>(label: impl Into<String>, prepare: P, play: F) -> Self
    where
        P: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            prepare: prepare.boxed(),
            play: Box::new(move |clip| play(clip).boxed()),
        }
    }

    /// Job whose clip already exists (no synthesis step)
    pub fn ready<F, Fut>(label: impl Into<String>, clip: T, play: F) -> Self
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(label, futures::future::ready(Ok(clip)), play)
    }
}

impl<T> PlaybackJob<T> {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> fmt::Debug for PlaybackJob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackJob")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

enum Unit<T> {
    /// Not spawned yet
    Idle(PlaybackJob<T>),
    /// Spawned, synthesis running or done, waiting for the start signal
    Prefetching {
        start: oneshot::Sender<()>,
        handle: JoinHandle<Result<()>>,
    },
    Running(JoinHandle<Result<()>>),
    Finished,
    Failed,
}

struct JobSlot<T> {
    label: String,
    unit: Unit<T>,
    enqueued_at: Instant,
    started_at: Option<Instant>,
}

impl<T> JobSlot<T> {
    fn status(&self) -> JobStatus {
        match self.unit {
            Unit::Idle(_) | Unit::Prefetching { .. } => JobStatus::BeforeStart,
            Unit::Running(_) => JobStatus::Running,
            Unit::Finished => JobStatus::Finish,
            Unit::Failed => JobStatus::Failed,
        }
    }

    fn abort(&self) {
        if let Unit::Prefetching { handle, .. } | Unit::Running(handle) = &self.unit {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

/// Ordered playback queue for one turn
///
/// Owned by a single control flow; nothing here is shared.
pub struct PlaybackQueue<T = AudioHandle> {
    jobs: Vec<JobSlot<T>>,
    /// Ordinal of the first job that is not `Finish`
    cursor: usize,
    lookahead: usize,
    abandoned_by: Option<usize>,
}

impl<T: Send + 'static> Default for PlaybackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> PlaybackQueue<T> {
    /// Queue prefetching synthesis for one job ahead
    pub fn new() -> Self {
        Self::with_lookahead(1)
    }

    pub fn with_lookahead(lookahead: usize) -> Self {
        Self {
            jobs: Vec::new(),
            cursor: 0,
            lookahead,
            abandoned_by: None,
        }
    }

    /// Append a job in `BeforeStart`; returns its ordinal
    pub fn enqueue(&mut self, job: PlaybackJob<T>) -> usize {
        let ordinal = self.jobs.len();
        debug!(ordinal, label = %job.label, "enqueued playback job");
        self.jobs.push(JobSlot {
            label: job.label.clone(),
            unit: Unit::Idle(job),
            enqueued_at: Instant::now(),
            started_at: None,
        });
        ordinal
    }

    /// Non-blocking controller tick
    ///
    /// Looks at the first unfinished job only: starts it when it has not
    /// started, or marks it finished when its unit completed. A call that
    /// finishes a job does not start the next one. Prefetch of upcoming
    /// synthesis is topped up on every call.
    pub fn advance(&mut self) -> Result<()> {
        if let Some(failed_ordinal) = self.abandoned_by {
            return Err(Error::QueueAbandoned { failed_ordinal });
        }

        let ordinal = self.cursor;
        let Some(slot) = self.jobs.get_mut(ordinal) else {
            return Ok(());
        };

        match std::mem::replace(&mut slot.unit, Unit::Finished) {
            Unit::Idle(job) => {
                let (start, handle) = spawn_unit(ordinal, job);
                // The receiver lives inside the unit that was just spawned
                let _ = start.send(());
                slot.unit = Unit::Running(handle);
                slot.started_at = Some(Instant::now());
                debug!(ordinal, label = %slot.label, "playback started");
            }
            Unit::Prefetching { start, mut handle } if handle.is_finished() => {
                // Ended without a start signal: prepare failed
                match poll_unit(&mut handle) {
                    Some(Err(e)) => {
                        slot.unit = Unit::Failed;
                        return Err(self.fail(ordinal, e));
                    }
                    Some(Ok(())) => {
                        slot.unit = Unit::Finished;
                        self.cursor += 1;
                    }
                    None => slot.unit = Unit::Prefetching { start, handle },
                }
            }
            Unit::Prefetching { start, handle } => {
                // A closed channel means prepare failed after the check
                // above; the next tick collects that error
                let _ = start.send(());
                slot.unit = Unit::Running(handle);
                slot.started_at = Some(Instant::now());
                debug!(
                    ordinal,
                    label = %slot.label,
                    queued_ms = slot.enqueued_at.elapsed().as_millis() as u64,
                    "playback started"
                );
            }
            Unit::Running(mut handle) => match poll_unit(&mut handle) {
                None => slot.unit = Unit::Running(handle),
                Some(Ok(())) => {
                    slot.unit = Unit::Finished;
                    debug!(
                        ordinal,
                        played_ms = slot
                            .started_at
                            .map(|t| t.elapsed().as_millis() as u64)
                            .unwrap_or_default(),
                        "playback finished"
                    );
                    self.cursor += 1;
                }
                Some(Err(e)) => {
                    slot.unit = Unit::Failed;
                    return Err(self.fail(ordinal, e));
                }
            },
            other => slot.unit = other,
        }

        self.prefetch();
        Ok(())
    }

    /// True iff the last enqueued job is `Finish` (an empty queue counts)
    ///
    /// Only the tail is inspected; strict start order makes every earlier
    /// job finished as well.
    pub fn is_drained(&self) -> bool {
        let Some(last) = self.jobs.last() else {
            return true;
        };
        let drained = last.status() == JobStatus::Finish;
        debug_assert!(
            !drained || self.jobs.iter().all(|j| j.status() == JobStatus::Finish),
            "tail finished before an earlier job"
        );
        drained
    }

    /// Jobs not yet finished
    pub fn pending(&self) -> usize {
        self.jobs.len() - self.cursor
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(JobSlot::status).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Ordinal of the job whose failure abandoned the queue
    pub fn abandoned_by(&self) -> Option<usize> {
        self.abandoned_by
    }

    pub fn label(&self, ordinal: usize) -> Option<&str> {
        self.jobs.get(ordinal).map(|j| j.label.as_str())
    }

    fn prefetch(&mut self) {
        let end = (self.cursor + 1 + self.lookahead).min(self.jobs.len());
        for ordinal in self.cursor..end {
            let slot = &mut self.jobs[ordinal];
            match &slot.unit {
                // Finished before its start signal: synthesis failed, so
                // nothing after it will ever play
                Unit::Prefetching { handle, .. } if handle.is_finished() => break,
                Unit::Idle(_) => {}
                _ => continue,
            }
            if let Unit::Idle(job) = std::mem::replace(&mut slot.unit, Unit::Finished) {
                let (start, handle) = spawn_unit(ordinal, job);
                slot.unit = Unit::Prefetching { start, handle };
                debug!(ordinal, label = %slot.label, "prefetching synthesis");
            }
        }
    }

    /// Abandon the queue after `failed_ordinal` failed
    fn fail(&mut self, failed_ordinal: usize, error: Error) -> Error {
        warn!(
            ordinal = failed_ordinal,
            label = %self.jobs[failed_ordinal].label,
            error = %error,
            "playback job failed, abandoning queue"
        );
        self.abandoned_by = Some(failed_ordinal);
        for slot in &self.jobs[failed_ordinal + 1..] {
            slot.abort();
        }
        error
    }
}

impl<T> Drop for PlaybackQueue<T> {
    fn drop(&mut self) {
        for slot in &self.jobs {
            slot.abort();
        }
    }
}

fn spawn_unit<T: Send + 'static>(
    ordinal: usize,
    job: PlaybackJob<T>,
) -> (oneshot::Sender<()>, JoinHandle<Result<()>>) {
    let (start_tx, start_rx) = oneshot::channel();
    let PlaybackJob { prepare, play, .. } = job;

    let handle = tokio::spawn(async move {
        let clip = prepare.await?;
        debug!(ordinal, "clip ready");
        if start_rx.await.is_err() {
            // Controller dropped before this job's turn
            return Ok(());
        }
        play(clip).await
    });

    (start_tx, handle)
}

/// Completion of a unit without blocking; `None` while it still runs
fn poll_unit(handle: &mut JoinHandle<Result<()>>) -> Option<Result<()>> {
    if !handle.is_finished() {
        return None;
    }
    handle
        .now_or_never()
        .map(|joined| joined.map_err(Error::from).and_then(|outcome| outcome))
}
