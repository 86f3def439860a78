//! Local narrative analysis by keyword heuristics.
//!
//! Estimates four narrative-language dimensions from a retell transcript:
//!
//! | Key | Dimension | Signal |
//! |-----|-----------|--------|
//! | EC  | Episode Complexity | problem, attempt and consequence words |
//! | SC  | Sentence Complexity | subordinating conjunctions and relative pronouns |
//! | VC  | Vocabulary Complexity | type-token ratio |
//! | NDC | Narrative Discourse Complexity | complete episode plus subordination |
//!
//! Each sub-score is out of 3, for a total out of 12.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use regex::Regex;

use readscore_core::error::ServiceError;
use readscore_core::model::{NarrativeAnalysis, SubScore};
use readscore_core::traits::AnalysisService;

const SUB_SCORE_MAX: u32 = 3;
pub const MAX_RETELL_SCORE: u32 = 12;

const SUBORDINATING: &str =
    r"(?i)\b(because|so that|when|after|before|although|while|since|if|unless|until)\b";
const RELATIVE: &str = r"(?i)\b(who|which|that)\b";
const CAUSAL: &str = r"(?i)\b(because|so|therefore|caused|made)\b";
const PROBLEM: &str =
    r"(?i)\b(problem|trouble|wrong|broke|lost|fell|hurt|scared|worried|upset|sad|angry|stuck)\b";
const ATTEMPT: &str =
    r"(?i)\b(tried|decided|went|looked|asked|helped|made|used|thought|wanted)\b";
const CONSEQUENCE: &str =
    r"(?i)\b(finally|then|happy|better|fixed|found|learned|end|resolved|glad|relieved)\b";

/// Keyword-based [`AnalysisService`] that needs no network.
pub struct HeuristicAnalyzer {
    subordinating: Regex,
    relative: Regex,
    causal: Regex,
    problem: Regex,
    attempt: Regex,
    consequence: Regex,
    sentence_end: Regex,
}

impl HeuristicAnalyzer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            subordinating: Regex::new(SUBORDINATING)?,
            relative: Regex::new(RELATIVE)?,
            causal: Regex::new(CAUSAL)?,
            problem: Regex::new(PROBLEM)?,
            attempt: Regex::new(ATTEMPT)?,
            consequence: Regex::new(CONSEQUENCE)?,
            sentence_end: Regex::new(r"[.!?]+")?,
        })
    }

    /// Analyze a transcript. Blank and bracketed placeholder transcripts
    /// yield an empty analysis.
    pub fn analyze_text(&self, transcript: &str) -> NarrativeAnalysis {
        if transcript.trim().is_empty() || transcript.starts_with('[') {
            return NarrativeAnalysis::default();
        }

        let sentence_count = self
            .sentence_end
            .split(transcript)
            .filter(|s| !s.trim().is_empty())
            .count() as u32;
        let words: Vec<&str> = transcript.split_whitespace().collect();
        let word_count = words.len() as u32;

        let count = |re: &Regex| re.find_iter(transcript).count() as u32;
        let subordinating = count(&self.subordinating);
        let relative = count(&self.relative);
        let causal = count(&self.causal);
        let has_problem = count(&self.problem) > 0;
        let has_attempt = count(&self.attempt) > 0;
        let has_consequence = count(&self.consequence) > 0;

        let unique_words = words
            .iter()
            .map(|w| {
                w.to_lowercase()
                    .trim_matches(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
                    .to_string()
            })
            .collect::<HashSet<_>>()
            .len() as u32;
        let ttr = unique_words as f64 / word_count.max(1) as f64;
        let ttr_display = (ttr * 1000.0).round() / 1000.0;

        let episode_complete = has_problem && has_attempt && has_consequence;
        let ec = [has_problem, has_attempt, has_consequence]
            .iter()
            .filter(|&&b| b)
            .count() as u32;
        let sc = (subordinating + relative).min(SUB_SCORE_MAX);
        let vc = if ttr > 0.7 {
            3
        } else if ttr > 0.5 {
            2
        } else if ttr > 0.3 {
            1
        } else {
            0
        };
        let ndc = if episode_complete && subordinating >= 2 && ttr > 0.5 {
            3
        } else if episode_complete && subordinating >= 1 {
            2
        } else if has_problem || has_attempt {
            1
        } else {
            0
        };

        let mut sub_scores = BTreeMap::new();
        sub_scores.insert(
            "EC".to_string(),
            sub_score(
                "Episode Complexity",
                ec,
                format!(
                    "Problem: {}, Attempt: {}, Consequence: {}",
                    yes_no(has_problem),
                    yes_no(has_attempt),
                    yes_no(has_consequence)
                ),
            ),
        );
        sub_scores.insert(
            "SC".to_string(),
            sub_score(
                "Sentence Complexity",
                sc,
                format!("{subordinating} subordinating conjunctions, {relative} relative clauses"),
            ),
        );
        sub_scores.insert(
            "VC".to_string(),
            sub_score(
                "Vocabulary Complexity",
                vc,
                format!("Type-token ratio: {ttr_display} ({unique_words}/{word_count})"),
            ),
        );
        sub_scores.insert(
            "NDC".to_string(),
            sub_score(
                "Narrative Discourse Complexity",
                ndc,
                format!(
                    "Episode complete: {}, causal connectors: {causal}",
                    yes_no(episode_complete)
                ),
            ),
        );

        NarrativeAnalysis {
            word_count,
            sentence_count,
            sub_scores,
            total_retell_score: ec + sc + vc + ndc,
            max_retell_score: MAX_RETELL_SCORE,
        }
    }
}

fn sub_score(label: &str, score: u32, detail: String) -> SubScore {
    SubScore {
        label: label.to_string(),
        score,
        max: SUB_SCORE_MAX,
        detail,
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

#[async_trait]
impl AnalysisService for HeuristicAnalyzer {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn analyze(
        &self,
        session_id: u64,
        transcript: &str,
    ) -> Result<NarrativeAnalysis, ServiceError> {
        let analysis = self.analyze_text(transcript);
        tracing::debug!(
            session_id,
            total = analysis.total_retell_score,
            "heuristic analysis complete"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> HeuristicAnalyzer {
        HeuristicAnalyzer::new().unwrap()
    }

    #[test]
    fn complete_episode_scores_high() {
        let text = "The boy lost his dog because the gate was open. \
                    He looked everywhere and asked his friend who lived nearby. \
                    Finally they found the dog when it barked, and he was happy.";
        let a = analyzer().analyze_text(text);

        assert_eq!(a.sentence_count, 3);
        assert_eq!(a.sub_scores["EC"].score, 3);
        assert_eq!(
            a.sub_scores["EC"].detail,
            "Problem: yes, Attempt: yes, Consequence: yes"
        );
        // because, when + who
        assert_eq!(a.sub_scores["SC"].score, 3);
        assert_eq!(a.sub_scores["NDC"].score, 3);
        assert_eq!(a.max_retell_score, 12);
        assert_eq!(
            a.total_retell_score,
            a.sub_scores.values().map(|s| s.score).sum::<u32>()
        );
    }

    #[test]
    fn repetitive_text_has_low_vocabulary() {
        let a = analyzer().analyze_text("dog dog dog dog dog dog dog dog dog cat");
        assert_eq!(a.word_count, 10);
        assert_eq!(a.sub_scores["VC"].score, 0);
        assert_eq!(a.sub_scores["VC"].detail, "Type-token ratio: 0.2 (2/10)");
        assert_eq!(a.sub_scores["EC"].score, 0);
        assert_eq!(a.sub_scores["NDC"].score, 0);
    }

    #[test]
    fn punctuation_is_ignored_for_unique_words() {
        let a = analyzer().analyze_text("Sad. sad, SAD!");
        assert_eq!(a.sub_scores["VC"].detail, "Type-token ratio: 0.333 (1/3)");
        assert_eq!(a.sub_scores["NDC"].score, 1);
    }

    #[test]
    fn word_boundaries_are_respected() {
        // "sofa" and "thatch" must not count as "so" or "that".
        let a = analyzer().analyze_text("The sofa had a thatch roof.");
        assert_eq!(a.sub_scores["SC"].score, 0);
        assert!(a.sub_scores["NDC"].detail.ends_with("causal connectors: 0"));
    }

    #[test]
    fn placeholder_and_blank_are_empty() {
        let analyzer = analyzer();
        assert!(analyzer.analyze_text("").is_empty());
        assert!(analyzer.analyze_text("   ").is_empty());
        assert!(analyzer
            .analyze_text("[IntelliScore placeholder] Audio recorded successfully.")
            .is_empty());
    }

    #[tokio::test]
    async fn service_interface() {
        let a = analyzer().analyze(1, "They tried and then fixed it.").await.unwrap();
        assert_eq!(a.sub_scores.len(), 4);
    }
}
