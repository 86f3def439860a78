//! Oral reading fluency.
//!
//! A 60-second [`TimedMarkingSession`] over the words of a passage, plus a
//! prosody rating the examiner must choose before the result can be
//! submitted.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MarkingError;
use crate::model::{ScoreEntry, Story};
use crate::timing::{MarkOutcome, MarkingPhase, TickOutcome, TimedMarkingSession};

pub const FLUENCY_TIME_LIMIT: Duration = Duration::from_secs(60);

/// Four-level prosody scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProsodyRating {
    WordByWord = 1,
    TwoWordPhrases = 2,
    ShortPhrases = 3,
    Expressive = 4,
}

impl ProsodyRating {
    pub const ALL: [ProsodyRating; 4] = [
        ProsodyRating::WordByWord,
        ProsodyRating::TwoWordPhrases,
        ProsodyRating::ShortPhrases,
        ProsodyRating::Expressive,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    /// The qualitative anchor shown to the examiner for this level.
    pub fn anchor(self) -> &'static str {
        match self {
            ProsodyRating::WordByWord => "Word-by-word reading. No meaningful syntax.",
            ProsodyRating::TwoWordPhrases => "Primarily 2-word phrases. Awkward groupings.",
            ProsodyRating::ShortPhrases => {
                "Primarily 3-4 word phrases. Mostly appropriate syntax."
            }
            ProsodyRating::Expressive => "Meaningful phrases. Appropriate syntax. Expressive.",
        }
    }
}

impl TryFrom<u8> for ProsodyRating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|r| r.value() == value)
            .ok_or_else(|| format!("prosody rating must be 1-4, got {value}"))
    }
}

impl From<ProsodyRating> for u8 {
    fn from(rating: ProsodyRating) -> Self {
        rating.value()
    }
}

impl fmt::Display for ProsodyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value(), self.anchor())
    }
}

/// Percentage of words read that were correct, rounded half up.
pub fn accuracy(cwpm: usize, words_read: usize) -> u32 {
    if words_read == 0 {
        return 0;
    }
    (100.0 * cwpm as f64 / words_read as f64).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluencyResult {
    pub words_read: usize,
    pub error_count: usize,
    pub cwpm: usize,
    pub accuracy: u32,
    pub prosody: Option<ProsodyRating>,
}

/// A fluency result that is ready to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FluencySubmission {
    pub words_read: usize,
    pub error_count: usize,
    pub cwpm: usize,
    pub accuracy: u32,
    pub prosody: ProsodyRating,
}

impl FluencySubmission {
    pub fn score_entries(&self) -> Vec<ScoreEntry> {
        vec![
            ScoreEntry::new("DECODING_FLUENCY", self.cwpm as u32),
            ScoreEntry::new("ACCURACY", self.accuracy).with_max(100),
            ScoreEntry::new("PROSODY", u32::from(self.prosody.value())).with_max(4),
        ]
    }
}

pub struct FluencyScorer {
    session: TimedMarkingSession,
    prosody: Option<ProsodyRating>,
}

impl FluencyScorer {
    /// Build a scorer over the whitespace-separated words of `passage`.
    pub fn new(passage: &str) -> Result<Self, MarkingError> {
        let words = passage.split_whitespace().map(str::to_owned).collect();
        Ok(Self {
            session: TimedMarkingSession::new(words, FLUENCY_TIME_LIMIT)?,
            prosody: None,
        })
    }

    pub fn from_story(story: &Story) -> Result<Self, MarkingError> {
        Self::new(&story.text)
    }

    pub fn session(&self) -> &TimedMarkingSession {
        &self.session
    }

    pub fn start(&mut self) -> Result<(), MarkingError> {
        self.session.start()
    }

    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        self.session.tick(elapsed)
    }

    pub fn stop(&mut self) -> Result<(), MarkingError> {
        self.session.stop()
    }

    pub fn mark_item(&mut self, index: usize) -> Result<MarkOutcome, MarkingError> {
        self.session.mark_item(index)
    }

    pub fn set_prosody(&mut self, rating: ProsodyRating) {
        self.prosody = Some(rating);
    }

    pub fn prosody(&self) -> Option<ProsodyRating> {
        self.prosody
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.prosody = None;
    }

    pub fn result(&self) -> FluencyResult {
        let marking = self.session.compute_result();
        FluencyResult {
            words_read: marking.words_read,
            error_count: marking.errors_in_window,
            cwpm: marking.score,
            accuracy: accuracy(marking.score, marking.words_read),
            prosody: self.prosody,
        }
    }

    /// The submittable result, available once the session is in review and
    /// a prosody rating has been chosen.
    pub fn submission(&self) -> Option<FluencySubmission> {
        if self.session.phase() != MarkingPhase::Review {
            return None;
        }
        let prosody = self.prosody?;
        let r = self.result();
        Some(FluencySubmission {
            words_read: r.words_read,
            error_count: r.error_count,
            cwpm: r.cwpm,
            accuracy: r.accuracy,
            prosody,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSAGE: &str = "The  fox ran to the \n old barn and hid  behind the hay";

    #[test]
    fn accuracy_bounds() {
        assert_eq!(accuracy(0, 0), 0);
        assert_eq!(accuracy(10, 10), 100);
        assert_eq!(accuracy(0, 25), 0);
        assert_eq!(accuracy(2, 3), 67);
        assert_eq!(accuracy(1, 8), 13);
    }

    #[test]
    fn tokenizes_on_whitespace() {
        let scorer = FluencyScorer::new(PASSAGE).unwrap();
        assert_eq!(scorer.session().item_count(), 12);
        assert_eq!(scorer.session().time_limit(), FLUENCY_TIME_LIMIT);
    }

    #[test]
    fn submission_requires_prosody() {
        let mut scorer = FluencyScorer::new(PASSAGE).unwrap();
        scorer.start().unwrap();
        scorer.mark_item(1).unwrap();
        scorer.stop().unwrap();
        scorer.mark_item(7).unwrap();
        assert!(scorer.submission().is_none());

        let r = scorer.result();
        assert_eq!(r.words_read, 8);
        assert_eq!(r.cwpm, 7);
        assert_eq!(r.accuracy, 88);
        assert_eq!(r.prosody, None);

        scorer.set_prosody(ProsodyRating::ShortPhrases);
        let sub = scorer.submission().unwrap();
        assert_eq!(sub.prosody.value(), 3);

        let entries = sub.score_entries();
        assert_eq!(entries[0].target, "DECODING_FLUENCY");
        assert_eq!(entries[0].raw_score, 7.0);
        assert_eq!(entries[1].raw_score, 88.0);
        assert_eq!(entries[2].raw_score, 3.0);
    }

    #[test]
    fn no_submission_before_review() {
        let mut scorer = FluencyScorer::new(PASSAGE).unwrap();
        scorer.set_prosody(ProsodyRating::Expressive);
        assert!(scorer.submission().is_none());
        scorer.start().unwrap();
        assert_eq!(scorer.tick(Duration::from_secs(60)), TickOutcome::Expired);
        assert!(scorer.submission().is_none());
    }

    #[test]
    fn reset_clears_prosody() {
        let mut scorer = FluencyScorer::new(PASSAGE).unwrap();
        scorer.start().unwrap();
        scorer.stop().unwrap();
        scorer.mark_item(3).unwrap();
        scorer.set_prosody(ProsodyRating::TwoWordPhrases);
        scorer.reset();
        assert_eq!(scorer.prosody(), None);
        assert_eq!(scorer.session().phase(), MarkingPhase::Ready);
    }

    #[test]
    fn prosody_rejects_zero() {
        assert!(ProsodyRating::try_from(0).is_err());
        assert!(ProsodyRating::try_from(5).is_err());
        assert_eq!(ProsodyRating::try_from(4).unwrap(), ProsodyRating::Expressive);
        let parsed: ProsodyRating = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, ProsodyRating::TwoWordPhrases);
    }
}
