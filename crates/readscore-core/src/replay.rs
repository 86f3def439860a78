//! Replaying recorded examiner events through a marking session.
//!
//! A replay script holds a stimulus and the sequence of clicks and timer
//! readings an examiner produced. Replaying it yields the same result the
//! live session would have.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MarkingError;
use crate::fluency::{FluencyResult, FluencyScorer, ProsodyRating};
use crate::grid::GridScorer;
use crate::model::ScoreEntry;
use crate::timing::{MarkingPhase, MarkingResult};

/// One examiner or timer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayEvent {
    Start,
    /// A timer reading, in seconds since start.
    Tick { elapsed_secs: f64 },
    Stop,
    Mark { index: usize },
    Prosody { rating: ProsodyRating },
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayMode {
    /// 60-second oral reading over a passage.
    Fluency { passage: String },
    /// Timed DDM grid.
    Grid {
        target: String,
        rows: Vec<Vec<String>>,
        time_limit_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayScript {
    pub id: String,
    pub mode: ReplayMode,
    pub events: Vec<ReplayEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub id: String,
    pub phase: MarkingPhase,
    pub elapsed_secs: f64,
    pub result: MarkingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluency: Option<FluencyResult>,
    /// Entries that would be recorded; empty when the result is not yet
    /// submittable.
    pub entries: Vec<ScoreEntry>,
}

enum Scorer {
    Fluency(FluencyScorer),
    Grid(GridScorer),
}

/// Negative readings clamp to zero; NaN, infinite, and overflowing ones
/// are rejected.
fn seconds(secs: f64) -> Result<Duration, MarkingError> {
    if !secs.is_finite() {
        return Err(MarkingError::InvalidTick(secs.to_string()));
    }
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|_| MarkingError::InvalidTick(secs.to_string()))
}

/// Run every event in order. Marks while ready are ignored, as they are
/// live; invalid transitions abort the replay.
pub fn replay(script: &ReplayScript) -> Result<ReplayReport, MarkingError> {
    let mut scorer = match &script.mode {
        ReplayMode::Fluency { passage } => Scorer::Fluency(FluencyScorer::new(passage)?),
        ReplayMode::Grid {
            target,
            rows,
            time_limit_secs,
        } => Scorer::Grid(GridScorer::new(target.clone(), rows, *time_limit_secs)?),
    };

    for (step, event) in script.events.iter().enumerate() {
        debug!(script = %script.id, step, ?event, "replay event");
        match (&mut scorer, event) {
            (Scorer::Fluency(s), ReplayEvent::Start) => s.start()?,
            (Scorer::Grid(s), ReplayEvent::Start) => s.start()?,
            (Scorer::Fluency(s), ReplayEvent::Tick { elapsed_secs }) => {
                s.tick(seconds(*elapsed_secs)?);
            }
            (Scorer::Grid(s), ReplayEvent::Tick { elapsed_secs }) => {
                s.tick(seconds(*elapsed_secs)?);
            }
            (Scorer::Fluency(s), ReplayEvent::Stop) => s.stop()?,
            (Scorer::Grid(s), ReplayEvent::Stop) => s.stop()?,
            (Scorer::Fluency(s), ReplayEvent::Mark { index }) => {
                s.mark_item(*index)?;
            }
            (Scorer::Grid(s), ReplayEvent::Mark { index }) => {
                s.mark_item(*index)?;
            }
            (Scorer::Fluency(s), ReplayEvent::Prosody { rating }) => s.set_prosody(*rating),
            (Scorer::Grid(_), ReplayEvent::Prosody { .. }) => {
                tracing::warn!(script = %script.id, step, "prosody ignored for grid replay");
            }
            (Scorer::Fluency(s), ReplayEvent::Reset) => s.reset(),
            (Scorer::Grid(s), ReplayEvent::Reset) => s.reset(),
        }
    }

    Ok(match scorer {
        Scorer::Fluency(s) => {
            let session = s.session();
            ReplayReport {
                id: script.id.clone(),
                phase: session.phase(),
                elapsed_secs: session.elapsed().as_secs_f64(),
                result: session.compute_result(),
                fluency: Some(s.result()),
                entries: s
                    .submission()
                    .map(|sub| sub.score_entries())
                    .unwrap_or_default(),
            }
        }
        Scorer::Grid(s) => {
            let session = s.session();
            let entries = if session.phase() == MarkingPhase::Review {
                vec![s.score_entry()]
            } else {
                Vec::new()
            };
            ReplayReport {
                id: script.id.clone(),
                phase: session.phase(),
                elapsed_secs: session.elapsed().as_secs_f64(),
                result: session.compute_result(),
                fluency: None,
                entries,
            }
        }
    })
}
