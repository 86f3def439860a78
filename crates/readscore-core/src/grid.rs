//! DDM grid, word list, and passage scorers.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use crate::error::MarkingError;
use crate::model::{DdmStimulus, ScoreEntry};
use crate::timing::{
    LiveMarkingSession, MarkOutcome, MarkingResult, TickOutcome, TimedMarkingSession, TimerConfig,
};

pub const GRID_MIN_SECS: u64 = 60;
pub const GRID_MAX_SECS: u64 = 120;
pub const DEFAULT_GRID_SECS: u64 = 60;

/// Nonsense words scored in the multisyllabic words-in-context passage.
pub const DEFAULT_PASSAGE_TARGETS: [&str; 10] = [
    "stodrun",
    "goupaik",
    "lirparg",
    "kighdost",
    "ungobers",
    "bimudgeic",
    "poughnigild",
    "grombacent",
    "lirmarves",
    "Tembog",
];

pub const WORDS_IN_CONTEXT: &str = "WORDS_IN_CONTEXT";

// ---------------------------------------------------------------------------
// Timed grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridResult {
    pub score: usize,
    /// Every marked item, including those past the boundary.
    pub errors: usize,
    pub words_read: usize,
}

impl From<MarkingResult> for GridResult {
    fn from(r: MarkingResult) -> Self {
        Self {
            score: r.score,
            errors: r.total_errors,
            words_read: r.words_read,
        }
    }
}

/// A timed grid flattened row-major into one marking session.
pub struct GridScorer {
    target: String,
    columns: usize,
    session: TimedMarkingSession,
}

impl GridScorer {
    pub fn new(
        target: impl Into<String>,
        rows: &[Vec<String>],
        time_limit_secs: u64,
    ) -> Result<Self, MarkingError> {
        if !(GRID_MIN_SECS..=GRID_MAX_SECS).contains(&time_limit_secs) {
            return Err(MarkingError::InvalidTimeLimit {
                secs: time_limit_secs,
                min: GRID_MIN_SECS,
                max: GRID_MAX_SECS,
            });
        }
        let columns = rows.first().map_or(0, Vec::len);
        let items: Vec<String> = rows.iter().flatten().cloned().collect();
        Ok(Self {
            target: target.into(),
            columns,
            session: TimedMarkingSession::new(items, Duration::from_secs(time_limit_secs))?,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn session(&self) -> &TimedMarkingSession {
        &self.session
    }

    /// Hand the grid to a wall-clock timer for a live administration.
    /// The timer expires the grid at its configured limit.
    pub fn into_live(self, config: TimerConfig) -> LiveMarkingSession {
        tracing::debug!(target_code = %self.target, "grid handed to live timer");
        LiveMarkingSession::new(self.session, config)
    }

    /// Row and column of a flattened index, measured against the first row.
    pub fn position(&self, index: usize) -> Option<(usize, usize)> {
        if self.columns == 0 || index >= self.session.item_count() {
            return None;
        }
        Some((index / self.columns, index % self.columns))
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

    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub fn result(&self) -> GridResult {
        self.session.compute_result().into()
    }

    pub fn score_entry(&self) -> ScoreEntry {
        ScoreEntry::new(self.target.clone(), self.result().score as u32)
    }
}

// ---------------------------------------------------------------------------
// Untimed word list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemMark {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListResult {
    pub score: usize,
    pub max: usize,
}

/// Untimed list where each word is toggled independently.
///
/// Items start unscored; the first click marks correct and later clicks
/// alternate between incorrect and correct.
pub struct WordListScorer {
    target: String,
    words: Vec<String>,
    marks: BTreeMap<usize, ItemMark>,
}

impl WordListScorer {
    pub fn new(target: impl Into<String>, words: Vec<String>) -> Result<Self, MarkingError> {
        if words.is_empty() {
            return Err(MarkingError::EmptyStimulus);
        }
        Ok(Self {
            target: target.into(),
            words,
            marks: BTreeMap::new(),
        })
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn mark(&self, index: usize) -> Option<ItemMark> {
        self.marks.get(&index).copied()
    }

    pub fn toggle(&mut self, index: usize) -> Result<ItemMark, MarkingError> {
        if index >= self.words.len() {
            return Err(MarkingError::IndexOutOfRange {
                index,
                len: self.words.len(),
            });
        }
        let next = match self.marks.get(&index) {
            Some(ItemMark::Correct) => ItemMark::Incorrect,
            _ => ItemMark::Correct,
        };
        self.marks.insert(index, next);
        Ok(next)
    }

    pub fn result(&self) -> ListResult {
        ListResult {
            score: self
                .marks
                .values()
                .filter(|m| **m == ItemMark::Correct)
                .count(),
            max: self.words.len(),
        }
    }

    pub fn score_entry(&self) -> ScoreEntry {
        let r = self.result();
        ScoreEntry::new(self.target.clone(), r.score as u32).with_max(r.max as u32)
    }
}

// ---------------------------------------------------------------------------
// Passage
// ---------------------------------------------------------------------------

/// A decoding passage where only target words can be marked correct.
pub struct PassageScorer {
    tokens: Vec<String>,
    markable: BTreeSet<usize>,
    correct: BTreeSet<usize>,
}

impl PassageScorer {
    pub fn new(passage: &str) -> Self {
        Self::with_targets(passage, &DEFAULT_PASSAGE_TARGETS)
    }

    /// A token is markable when it contains any target word, ignoring case.
    pub fn with_targets(passage: &str, targets: &[&str]) -> Self {
        let targets: Vec<String> = targets.iter().map(|t| t.to_lowercase()).collect();
        let tokens: Vec<String> = passage.split_whitespace().map(str::to_owned).collect();
        let markable = tokens
            .iter()
            .enumerate()
            .filter(|(_, tok)| {
                let tok = tok.to_lowercase();
                targets.iter().any(|t| tok.contains(t.as_str()))
            })
            .map(|(i, _)| i)
            .collect();
        Self {
            tokens,
            markable,
            correct: BTreeSet::new(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_markable(&self, index: usize) -> bool {
        self.markable.contains(&index)
    }

    pub fn is_correct(&self, index: usize) -> bool {
        self.correct.contains(&index)
    }

    /// Toggle a target word. Returns `None` for inert tokens.
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        if !self.markable.contains(&index) {
            return None;
        }
        if self.correct.remove(&index) {
            Some(false)
        } else {
            self.correct.insert(index);
            Some(true)
        }
    }

    pub fn result(&self) -> ListResult {
        ListResult {
            score: self.correct.len(),
            max: self.markable.len(),
        }
    }

    pub fn score_entry(&self) -> ScoreEntry {
        let r = self.result();
        ScoreEntry::new(WORDS_IN_CONTEXT, r.score as u32).with_max(r.max as u32)
    }
}

/// The scorer appropriate to a DDM stimulus shape.
pub enum DdmScorer {
    Grid(GridScorer),
    WordList(WordListScorer),
    Passage(PassageScorer),
}

impl DdmScorer {
    pub fn for_stimulus(
        target: &str,
        stimulus: &DdmStimulus,
        time_limit_secs: u64,
    ) -> Result<Self, MarkingError> {
        Ok(match stimulus {
            DdmStimulus::Grid(rows) => {
                DdmScorer::Grid(GridScorer::new(target, rows, time_limit_secs)?)
            }
            DdmStimulus::WordList(words) => {
                DdmScorer::WordList(WordListScorer::new(target, words.clone())?)
            }
            DdmStimulus::Passage(text) => DdmScorer::Passage(PassageScorer::new(text)),
        })
    }

    pub fn score_entry(&self) -> ScoreEntry {
        match self {
            DdmScorer::Grid(s) => s.score_entry(),
            DdmScorer::WordList(s) => s.score_entry(),
            DdmScorer::Passage(s) => s.score_entry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n_rows: usize, n_cols: usize) -> Vec<Vec<String>> {
        (0..n_rows)
            .map(|r| (0..n_cols).map(|c| format!("{r}{c}")).collect())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn live_grid_expires_and_scores() {
        let grid = GridScorer::new("LETTER_NAMES", &rows(5, 8), 60).unwrap();
        let mut live = grid.into_live(TimerConfig::default());
        live.start().unwrap();
        live.mark_item(3).unwrap();
        live.mark_item(10).unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(live.phase(), crate::timing::MarkingPhase::MarkLast);
        assert_eq!(live.elapsed(), Duration::from_secs(60));

        assert_eq!(live.mark_item(25).unwrap(), MarkOutcome::BoundarySet(25));
        let result = live.compute_result();
        assert_eq!(result.words_read, 26);
        assert_eq!(result.errors_in_window, 2);
        assert_eq!(result.score, 24);
    }

    #[test]
    fn time_limit_is_validated() {
        assert!(GridScorer::new("LETTER_NAMES", &rows(2, 2), 60).is_ok());
        assert!(GridScorer::new("LETTER_NAMES", &rows(2, 2), 120).is_ok());
        assert_eq!(
            GridScorer::new("LETTER_NAMES", &rows(2, 2), 45).err(),
            Some(MarkingError::InvalidTimeLimit {
                secs: 45,
                min: 60,
                max: 120
            })
        );
    }

    #[test]
    fn grid_flattens_row_major() {
        let grid = GridScorer::new("LETTER_SOUNDS", &rows(5, 8), 60).unwrap();
        assert_eq!(grid.session().item_count(), 40);
        assert_eq!(grid.position(0), Some((0, 0)));
        assert_eq!(grid.position(9), Some((1, 1)));
        assert_eq!(grid.position(40), None);
        assert_eq!(grid.session().items().nth(9).unwrap().content, "11");
    }

    #[test]
    fn grid_reports_all_marked_errors() {
        let mut grid = GridScorer::new("LETTER_SOUNDS", &rows(5, 8), 60).unwrap();
        grid.start().unwrap();
        grid.mark_item(3).unwrap();
        grid.mark_item(10).unwrap();
        grid.mark_item(30).unwrap();
        grid.tick(Duration::from_secs(60));
        grid.mark_item(25).unwrap();

        let r = grid.result();
        assert_eq!(r.words_read, 26);
        assert_eq!(r.score, 24);
        assert_eq!(r.errors, 3);
        assert_eq!(grid.score_entry().raw_score, 24.0);
    }

    #[test]
    fn word_list_cycles_after_first_click() {
        let words = vec!["cat".to_string(), "ship".into(), "blend".into()];
        let mut list = WordListScorer::new("CLOSED_SYLLABLES", words).unwrap();
        assert_eq!(list.mark(0), None);
        assert_eq!(list.toggle(0).unwrap(), ItemMark::Correct);
        assert_eq!(list.toggle(0).unwrap(), ItemMark::Incorrect);
        assert_eq!(list.toggle(0).unwrap(), ItemMark::Correct);
        list.toggle(1).unwrap();
        list.toggle(2).unwrap();
        list.toggle(2).unwrap();
        assert_eq!(list.result(), ListResult { score: 2, max: 3 });
        assert!(list.toggle(3).is_err());
    }

    #[test]
    fn passage_only_target_words_are_markable() {
        let text = "The STODRUN ran past goupaik's hut to the lirparg.";
        let mut passage = PassageScorer::new(text);
        assert!(passage.is_markable(1));
        assert!(passage.is_markable(4));
        assert!(passage.is_markable(8));
        assert!(!passage.is_markable(0));

        assert_eq!(passage.toggle(0), None);
        assert_eq!(passage.toggle(1), Some(true));
        assert_eq!(passage.toggle(4), Some(true));
        assert_eq!(passage.toggle(4), Some(false));
        assert_eq!(passage.result(), ListResult { score: 1, max: 3 });
        assert_eq!(passage.score_entry().target, WORDS_IN_CONTEXT);
    }

    #[test]
    fn dispatch_by_stimulus_shape() {
        let grid = DdmStimulus::Grid(rows(2, 3));
        assert!(matches!(
            DdmScorer::for_stimulus("LETTER_NAMES", &grid, 60).unwrap(),
            DdmScorer::Grid(_)
        ));
        let list = DdmStimulus::WordList(vec!["cake".into()]);
        assert!(matches!(
            DdmScorer::for_stimulus("VCE", &list, 60).unwrap(),
            DdmScorer::WordList(_)
        ));
        let passage = DdmStimulus::Passage("Tembog sat.".into());
        let scorer = DdmScorer::for_stimulus("ADVANCED_WORD_FORMS", &passage, 60).unwrap();
        assert_eq!(scorer.score_entry().max_score, Some(1.0));
    }
}
