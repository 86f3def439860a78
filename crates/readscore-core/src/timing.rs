//! Timed marking sessions.
//!
//! [`TimedMarkingSession`] is the pure state machine shared by every timed
//! subtest: a countdown over a sequence of markable items, an early stop,
//! a "mark the last item attempted" step, and a review step where error
//! marks can still be toggled. [`LiveMarkingSession`] drives it from a
//! periodic tokio timer task.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::MarkingError;

// ---------------------------------------------------------------------------
// Phases and transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingPhase {
    Ready,
    Running,
    MarkLast,
    Review,
}

impl fmt::Display for MarkingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkingPhase::Ready => "ready",
            MarkingPhase::Running => "running",
            MarkingPhase::MarkLast => "mark_last",
            MarkingPhase::Review => "review",
        };
        f.write_str(name)
    }
}

/// Events that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingAction {
    Start,
    /// The timer reached the time limit.
    Expire,
    Stop,
    /// First click after the timer ends: the last item attempted.
    MarkBoundary,
    Reset,
}

impl fmt::Display for MarkingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkingAction::Start => "start",
            MarkingAction::Expire => "expire",
            MarkingAction::Stop => "stop",
            MarkingAction::MarkBoundary => "mark boundary",
            MarkingAction::Reset => "reset",
        };
        f.write_str(name)
    }
}

use MarkingAction as A;
use MarkingPhase as P;

/// Every permitted `(from, action) -> to` transition.
const TRANSITIONS: &[(MarkingPhase, MarkingAction, MarkingPhase)] = &[
    (P::Ready, A::Start, P::Running),
    (P::Running, A::Expire, P::MarkLast),
    (P::Running, A::Stop, P::MarkLast),
    (P::MarkLast, A::MarkBoundary, P::Review),
    (P::Ready, A::Reset, P::Ready),
    (P::Running, A::Reset, P::Ready),
    (P::MarkLast, A::Reset, P::Ready),
    (P::Review, A::Reset, P::Ready),
];

/// Look up the phase reached by applying `action` in `from`.
pub fn next_phase(from: MarkingPhase, action: MarkingAction) -> Option<MarkingPhase> {
    TRANSITIONS
        .iter()
        .find(|(f, a, _)| *f == from && *a == action)
        .map(|(_, _, to)| *to)
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// A read-only view of one item in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkingItem<'a> {
    pub index: usize,
    pub content: &'a str,
    pub marked_incorrect: bool,
    pub is_boundary: bool,
}

/// What a call to [`TimedMarkingSession::mark_item`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The session is not accepting marks yet.
    Ignored,
    /// The error mark on `index` was flipped to `marked`.
    Toggled { index: usize, marked: bool },
    /// `index` was recorded as the last item attempted.
    BoundarySet(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Elapsed time was updated and the clock keeps running.
    Running,
    /// The time limit was reached; the session moved to mark_last.
    Expired,
    /// The session is not running; the tick was ignored.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkingResult {
    pub words_read: usize,
    pub errors_in_window: usize,
    /// All marked items, including any past the boundary.
    pub total_errors: usize,
    pub score: usize,
}

#[derive(Debug, Clone)]
pub struct TimedMarkingSession {
    items: Vec<String>,
    time_limit: Duration,
    phase: MarkingPhase,
    elapsed: Duration,
    marked: BTreeSet<usize>,
    boundary: Option<usize>,
    started_at: Option<DateTime<Utc>>,
}

impl TimedMarkingSession {
    pub fn new(items: Vec<String>, time_limit: Duration) -> Result<Self, MarkingError> {
        if items.is_empty() {
            return Err(MarkingError::EmptyStimulus);
        }
        Ok(Self {
            items,
            time_limit,
            phase: MarkingPhase::Ready,
            elapsed: Duration::ZERO,
            marked: BTreeSet::new(),
            boundary: None,
            started_at: None,
        })
    }

    pub fn phase(&self) -> MarkingPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn remaining(&self) -> Duration {
        self.time_limit.saturating_sub(self.elapsed)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn boundary(&self) -> Option<usize> {
        self.boundary
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_marked(&self, index: usize) -> bool {
        self.marked.contains(&index)
    }

    pub fn items(&self) -> impl Iterator<Item = MarkingItem<'_>> {
        self.items.iter().enumerate().map(|(index, content)| MarkingItem {
            index,
            content,
            marked_incorrect: self.marked.contains(&index),
            is_boundary: self.boundary == Some(index),
        })
    }

    fn transition(&mut self, action: MarkingAction) -> Result<MarkingPhase, MarkingError> {
        let to = next_phase(self.phase, action).ok_or(MarkingError::InvalidTransition {
            from: self.phase,
            action,
        })?;
        tracing::debug!(from = %self.phase, %action, %to, "marking transition");
        self.phase = to;
        Ok(to)
    }

    /// Begin the clock. Clears elapsed time, marks, and the boundary.
    pub fn start(&mut self) -> Result<(), MarkingError> {
        self.transition(MarkingAction::Start)?;
        self.elapsed = Duration::ZERO;
        self.marked.clear();
        self.boundary = None;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Update elapsed time, measured from start. Expires the session once
    /// the time limit is reached.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        if self.phase != MarkingPhase::Running {
            return TickOutcome::Idle;
        }
        self.elapsed = elapsed.min(self.time_limit);
        if elapsed >= self.time_limit {
            // Running -> MarkLast on Expire is always in the table.
            let _ = self.transition(MarkingAction::Expire);
            TickOutcome::Expired
        } else {
            TickOutcome::Running
        }
    }

    /// End the timed portion early.
    pub fn stop(&mut self) -> Result<(), MarkingError> {
        self.transition(MarkingAction::Stop).map(|_| ())
    }

    /// Handle an examiner click on item `index`.
    pub fn mark_item(&mut self, index: usize) -> Result<MarkOutcome, MarkingError> {
        if self.phase == MarkingPhase::Ready {
            return Ok(MarkOutcome::Ignored);
        }
        if index >= self.items.len() {
            return Err(MarkingError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        match self.phase {
            MarkingPhase::MarkLast => {
                self.transition(MarkingAction::MarkBoundary)?;
                self.boundary = Some(index);
                Ok(MarkOutcome::BoundarySet(index))
            }
            _ => {
                let marked = if self.marked.remove(&index) {
                    false
                } else {
                    self.marked.insert(index);
                    true
                };
                Ok(MarkOutcome::Toggled { index, marked })
            }
        }
    }

    pub fn compute_result(&self) -> MarkingResult {
        let words_read = self.boundary.map_or(self.items.len(), |b| b + 1);
        let errors_in_window = self.marked.range(..words_read).count();
        MarkingResult {
            words_read,
            errors_in_window,
            total_errors: self.marked.len(),
            score: words_read.saturating_sub(errors_in_window),
        }
    }

    /// Return to ready and drop all session state.
    pub fn reset(&mut self) {
        // Reset is permitted from every phase.
        let _ = self.transition(MarkingAction::Reset);
        self.elapsed = Duration::ZERO;
        self.marked.clear();
        self.boundary = None;
        self.started_at = None;
    }
}

// ---------------------------------------------------------------------------
// Live timer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub tick_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
        }
    }
}

/// A [`TimedMarkingSession`] driven by a periodic timer task.
///
/// At most one timer task exists per session. It is aborted on stop,
/// reset, and drop, so abandoning the session mid-run never leaks it.
/// Must be started from within a tokio runtime.
pub struct LiveMarkingSession {
    session: Arc<Mutex<TimedMarkingSession>>,
    timer: Option<JoinHandle<()>>,
    config: TimerConfig,
}

impl LiveMarkingSession {
    pub fn new(session: TimedMarkingSession, config: TimerConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            timer: None,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimedMarkingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&mut self) -> Result<(), MarkingError> {
        self.lock().start()?;
        self.cancel_timer();

        let session = Arc::clone(&self.session);
        let tick = self.config.tick_interval;
        self.timer = Some(tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcome = session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .tick(started.elapsed());
                match outcome {
                    TickOutcome::Running => {}
                    TickOutcome::Expired => {
                        tracing::info!("time limit reached");
                        break;
                    }
                    TickOutcome::Idle => break,
                }
            }
        }));
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), MarkingError> {
        self.lock().stop()?;
        self.cancel_timer();
        Ok(())
    }

    pub fn mark_item(&self, index: usize) -> Result<MarkOutcome, MarkingError> {
        self.lock().mark_item(index)
    }

    pub fn reset(&mut self) {
        self.cancel_timer();
        self.lock().reset();
    }

    pub fn phase(&self) -> MarkingPhase {
        self.lock().phase()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed()
    }

    pub fn compute_result(&self) -> MarkingResult {
        self.lock().compute_result()
    }

    /// Run `f` against the current session state.
    pub fn with_session<R>(&self, f: impl FnOnce(&TimedMarkingSession) -> R) -> R {
        f(&self.lock())
    }

    pub fn is_timer_active(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for LiveMarkingSession {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
