//! Narrative retell composite scoring.
//!
//! The retell score is a pure function of the examiner's judgments. It
//! combines narrative discourse complexity (NDC), sentence complexity (SC),
//! expository discourse complexity (EDC), vocabulary complexity (VC), and
//! two episode complexity scores (EC1, EC2) derived from the NDC judgments
//! through ordered rule tables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MarkingError;
use crate::model::{Grade, ScoreEntry};

pub const RETELL_TARGET: &str = "NLM_RETELL";
pub const MAX_CONJUNCTION_CREDIT: u32 = 3;
pub const MAX_CUSTOM_WORDS: usize = 2;
pub const EPISODE_MAX: u32 = 5;

// ---------------------------------------------------------------------------
// Rubric catalogs
// ---------------------------------------------------------------------------

/// Story-grammar elements judged for NDC, in administration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NdcElement {
    Character,
    Setting,
    Problem,
    Feeling1,
    Plan,
    Attempt,
    Complication,
    Feeling2,
    Plan2,
    Attempt2,
    Consequence,
    Ending,
    #[serde(rename = "endFeeling", alias = "end_feeling")]
    EndFeeling,
}

/// Elements scored for single-episode stories.
pub const SINGLE_EPISODE_ELEMENTS: usize = 10;

impl NdcElement {
    pub const ALL: [NdcElement; 13] = [
        NdcElement::Character,
        NdcElement::Setting,
        NdcElement::Problem,
        NdcElement::Feeling1,
        NdcElement::Plan,
        NdcElement::Attempt,
        NdcElement::Complication,
        NdcElement::Feeling2,
        NdcElement::Plan2,
        NdcElement::Attempt2,
        NdcElement::Consequence,
        NdcElement::Ending,
        NdcElement::EndFeeling,
    ];

    /// The elements judged at `grade`.
    pub fn active(grade: Grade) -> &'static [NdcElement] {
        if grade.is_dual_episode() {
            &Self::ALL
        } else {
            &Self::ALL[..SINGLE_EPISODE_ELEMENTS]
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NdcElement::Character => "Character",
            NdcElement::Setting => "Setting",
            NdcElement::Problem => "Problem",
            NdcElement::Feeling1 => "Feeling (Problem)",
            NdcElement::Plan => "Plan",
            NdcElement::Attempt => "Attempt",
            NdcElement::Complication => "Complication / Consequence",
            NdcElement::Feeling2 => "Feeling (Complication)",
            NdcElement::Plan2 => "Plan 2",
            NdcElement::Attempt2 => "Attempt 2",
            NdcElement::Consequence => "Consequence",
            NdcElement::Ending => "Ending",
            NdcElement::EndFeeling => "Ending Feeling",
        }
    }

    /// Descriptor for each level, indexed by level value.
    pub fn descriptors(self) -> [&'static str; 3] {
        match self {
            NdcElement::Character => [
                "Only pronouns",
                "Generic description (boy, girl)",
                "Name or proper identifier",
            ],
            NdcElement::Setting => [
                "No setting info",
                "Activity OR location",
                "Activity AND location",
            ],
            NdcElement::Problem => ["No problem", "Incomplete or unclear", "Complete & clear"],
            NdcElement::Feeling1 | NdcElement::Feeling2 => {
                ["No emotion", "General emotion/behavior", "Specific emotion"]
            }
            NdcElement::Plan | NdcElement::Plan2 => [
                "No cognitive verb",
                "Cognitive verb only",
                "Cognitive verb + specific plan",
            ],
            NdcElement::Attempt => [
                "No attempt",
                "General without dialogue",
                "Specific with dialogue",
            ],
            NdcElement::Attempt2 => [
                "No 2nd attempt",
                "General without dialogue",
                "Specific with dialogue",
            ],
            NdcElement::Complication => [
                "No complication",
                "Incomplete restated",
                "Complete & clear restated problem",
            ],
            NdcElement::Consequence => ["No result", "Incomplete/unclear", "Complete & clear result"],
            NdcElement::Ending => ["No events", "Incomplete events", "Complete events after solving"],
            NdcElement::EndFeeling => ["No emotion", "General emotion", "Specific emotion"],
        }
    }
}

/// An ordinal NDC judgment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    #[default]
    Absent = 0,
    Partial = 1,
    Complete = 2,
}

impl Level {
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u8> for Level {
    type Error = MarkingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Level::Absent),
            1 => Ok(Level::Partial),
            2 => Ok(Level::Complete),
            _ => Err(MarkingError::ValueOutOfRange {
                field: "NDC level".into(),
                value: u32::from(value),
                max: 2,
            }),
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level as u8
    }
}

/// Complex-conjunction categories counted for SC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conjunction {
    BecauseSo,
    WhenWhile,
    AfterBefore,
    SinceAlthough,
    WhoWhichThat,
}

impl Conjunction {
    pub const ALL: [Conjunction; 5] = [
        Conjunction::BecauseSo,
        Conjunction::WhenWhile,
        Conjunction::AfterBefore,
        Conjunction::SinceAlthough,
        Conjunction::WhoWhichThat,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Conjunction::BecauseSo => "because / so that",
            Conjunction::WhenWhile => "when / while",
            Conjunction::AfterBefore => "after / before",
            Conjunction::SinceAlthough => "since / although / even though / however",
            Conjunction::WhoWhichThat => "(noun) who / which / that",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpositoryElement {
    MainIdea,
    Detail1,
    Detail2,
}

impl ExpositoryElement {
    pub const ALL: [ExpositoryElement; 3] = [
        ExpositoryElement::MainIdea,
        ExpositoryElement::Detail1,
        ExpositoryElement::Detail2,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExpositoryElement::MainIdea => "Main Idea (expository content)",
            ExpositoryElement::Detail1 => "Supporting Detail 1",
            ExpositoryElement::Detail2 => "Supporting Detail 2",
        }
    }
}

/// Fixed tier-2 vocabulary checked for VC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier2Word {
    Expertly,
    Fabricated,
    Expansive,
    Collaborated,
    Pleased,
    Stolen,
}

impl Tier2Word {
    pub const ALL: [Tier2Word; 6] = [
        Tier2Word::Expertly,
        Tier2Word::Fabricated,
        Tier2Word::Expansive,
        Tier2Word::Collaborated,
        Tier2Word::Pleased,
        Tier2Word::Stolen,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomWord {
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

// ---------------------------------------------------------------------------
// Judgments
// ---------------------------------------------------------------------------

/// Everything the examiner records while listening to a retell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetellJudgments {
    #[serde(default)]
    pub ndc: BTreeMap<NdcElement, Level>,
    #[serde(default)]
    pub conjunctions: BTreeMap<Conjunction, u32>,
    #[serde(default)]
    pub expository: BTreeSet<ExpositoryElement>,
    #[serde(default)]
    pub vocabulary: BTreeSet<Tier2Word>,
    #[serde(default)]
    pub custom_words: Vec<CustomWord>,
}

impl RetellJudgments {
    pub fn level(&self, element: NdcElement) -> Level {
        self.ndc.get(&element).copied().unwrap_or_default()
    }

    pub fn set_level(&mut self, element: NdcElement, level: Level) {
        self.ndc.insert(element, level);
    }

    pub fn set_conjunction_count(&mut self, conjunction: Conjunction, count: u32) {
        self.conjunctions.insert(conjunction, count);
    }

    pub fn toggle_expository(&mut self, element: ExpositoryElement) -> bool {
        if self.expository.remove(&element) {
            false
        } else {
            self.expository.insert(element);
            true
        }
    }

    pub fn toggle_word(&mut self, word: Tier2Word) -> bool {
        if self.vocabulary.remove(&word) {
            false
        } else {
            self.vocabulary.insert(word);
            true
        }
    }

    /// Fill one of the custom vocabulary slots.
    pub fn set_custom_word(
        &mut self,
        slot: usize,
        text: impl Into<String>,
        checked: bool,
    ) -> Result<(), MarkingError> {
        if slot >= MAX_CUSTOM_WORDS {
            return Err(MarkingError::IndexOutOfRange {
                index: slot,
                len: MAX_CUSTOM_WORDS,
            });
        }
        if self.custom_words.len() <= slot {
            self.custom_words.resize_with(slot + 1, CustomWord::default);
        }
        self.custom_words[slot] = CustomWord {
            text: text.into(),
            checked,
        };
        Ok(())
    }

    fn present(&self, element: NdcElement) -> bool {
        self.level(element) > Level::Absent
    }
}

// ---------------------------------------------------------------------------
// Episode complexity rule tables
// ---------------------------------------------------------------------------

/// Presence flags for the story-grammar elements that drive EC1 and EC2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeFlags {
    pub problem: bool,
    pub attempt: bool,
    pub consequence: bool,
    pub ending: bool,
    pub complication: bool,
    pub plan2: bool,
    pub attempt2: bool,
}

impl EpisodeFlags {
    pub fn from_judgments(j: &RetellJudgments) -> Self {
        Self {
            problem: j.present(NdcElement::Problem),
            attempt: j.present(NdcElement::Attempt),
            consequence: j.present(NdcElement::Consequence),
            ending: j.present(NdcElement::Ending),
            complication: j.present(NdcElement::Complication),
            plan2: j.present(NdcElement::Plan2),
            attempt2: j.present(NdcElement::Attempt2),
        }
    }
}

/// One row of an episode complexity table.
pub struct EpisodeRule {
    pub value: u32,
    pub when: fn(&EpisodeFlags) -> bool,
}

/// Rows are not mutually exclusive; the first match determines the score.
pub const EC1_RULES: &[EpisodeRule] = &[
    EpisodeRule {
        value: 5,
        when: |f: &EpisodeFlags| f.problem && f.attempt && f.consequence && f.ending,
    },
    EpisodeRule {
        value: 4,
        when: |f: &EpisodeFlags| f.problem && f.attempt && f.consequence,
    },
    EpisodeRule {
        value: 3,
        when: |f: &EpisodeFlags| {
            (f.problem && f.consequence && f.ending) || (f.problem && f.attempt && f.ending)
        },
    },
    EpisodeRule {
        value: 2,
        when: |f: &EpisodeFlags| {
            (f.problem && f.attempt) || (f.problem && f.consequence) || (f.attempt && f.consequence)
        },
    },
    EpisodeRule {
        value: 1,
        when: |f: &EpisodeFlags| f.problem || f.attempt || f.consequence,
    },
];

/// The second episode reuses consequence and ending from the first.
pub const EC2_RULES: &[EpisodeRule] = &[
    EpisodeRule {
        value: 5,
        when: |f: &EpisodeFlags| f.complication && f.attempt2 && f.consequence && f.ending,
    },
    EpisodeRule {
        value: 4,
        when: |f: &EpisodeFlags| f.complication && f.attempt2 && f.consequence,
    },
    EpisodeRule {
        value: 3,
        when: |f: &EpisodeFlags| {
            (f.complication && f.consequence && f.ending)
                || (f.complication && f.attempt2 && f.ending)
        },
    },
    EpisodeRule {
        value: 2,
        when: |f: &EpisodeFlags| {
            (f.complication && f.plan2)
                || (f.complication && f.attempt2)
                || (f.complication && f.consequence)
        },
    },
    EpisodeRule {
        value: 1,
        when: |f: &EpisodeFlags| f.complication,
    },
];

/// Value of the first rule that applies, or 0.
pub fn evaluate_rules(rules: &[EpisodeRule], flags: &EpisodeFlags) -> u32 {
    rules
        .iter()
        .find(|rule| (rule.when)(flags))
        .map_or(0, |rule| rule.value)
}

// ---------------------------------------------------------------------------
// Composite score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetellScore {
    pub dual_episode: bool,
    pub ndc: u32,
    pub ndc_max: u32,
    pub sc: u32,
    pub sc_max: u32,
    pub edc: u32,
    pub edc_max: u32,
    /// Open-ended; there is no maximum.
    pub vc: u32,
    pub ec1: u32,
    pub ec1_max: u32,
    pub ec2: u32,
    pub ec2_max: u32,
    pub total: u32,
}

pub fn score_retell(judgments: &RetellJudgments, grade: Grade) -> RetellScore {
    let dual_episode = grade.is_dual_episode();
    let active = NdcElement::active(grade);

    let ndc = active.iter().map(|el| judgments.level(*el).value()).sum();
    let sc = Conjunction::ALL
        .iter()
        .map(|c| {
            judgments
                .conjunctions
                .get(c)
                .copied()
                .unwrap_or(0)
                .min(MAX_CONJUNCTION_CREDIT)
        })
        .sum();
    let edc = judgments.expository.len() as u32;
    let custom = judgments
        .custom_words
        .iter()
        .take(MAX_CUSTOM_WORDS)
        .filter(|w| w.checked)
        .count();
    let vc = (judgments.vocabulary.len() + custom) as u32;

    let flags = EpisodeFlags::from_judgments(judgments);
    let ec1 = evaluate_rules(EC1_RULES, &flags);
    let ec2 = if dual_episode {
        evaluate_rules(EC2_RULES, &flags)
    } else {
        0
    };

    RetellScore {
        dual_episode,
        ndc,
        ndc_max: active.len() as u32 * 2,
        sc,
        sc_max: Conjunction::ALL.len() as u32 * MAX_CONJUNCTION_CREDIT,
        edc,
        edc_max: ExpositoryElement::ALL.len() as u32,
        vc,
        ec1,
        ec1_max: EPISODE_MAX,
        ec2,
        ec2_max: if dual_episode { EPISODE_MAX } else { 0 },
        total: ndc + sc + edc + vc + ec1 + ec2,
    }
}

impl RetellScore {
    /// Entries recorded for the retell: the total, then each dimension as a
    /// sub-target.
    pub fn score_entries(&self) -> Vec<ScoreEntry> {
        let sub = |name: &str, value: u32, max: Option<u32>| {
            let entry = ScoreEntry::new(RETELL_TARGET, value).with_sub_target(name);
            match max {
                Some(m) => entry.with_max(m),
                None => entry,
            }
        };
        let mut entries = vec![
            ScoreEntry::new(RETELL_TARGET, self.total),
            sub("NDC", self.ndc, Some(self.ndc_max)),
            sub("SC", self.sc, Some(self.sc_max)),
            sub("EDC", self.edc, Some(self.edc_max)),
            sub("VC", self.vc, None),
            sub("EC1", self.ec1, Some(self.ec1_max)),
        ];
        if self.dual_episode {
            entries.push(sub("EC2", self.ec2, Some(self.ec2_max)));
        }
        entries
    }
}
