//! Per-item tally scorers: phoneme tasks and comprehension questions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MarkingError;
use crate::model::ScoreEntry;

// ---------------------------------------------------------------------------
// Phoneme tasks
// ---------------------------------------------------------------------------

pub const DEFAULT_ITEM_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhonemeItem {
    pub prompt: String,
    #[serde(default)]
    pub answer: String,
}

const PHONEME_SEGMENTATION: [(&str, &str); 10] = [
    ("mat", "/m/ /a/ /t/"),
    ("sun", "/s/ /u/ /n/"),
    ("fish", "/f/ /i/ /sh/"),
    ("red", "/r/ /e/ /d/"),
    ("block", "/b/ /l/ /o/ /k/"),
    ("stop", "/s/ /t/ /o/ /p/"),
    ("grape", "/g/ /r/ /a/ /p/"),
    ("smile", "/s/ /m/ /i/ /l/"),
    ("plant", "/p/ /l/ /a/ /n/ /t/"),
    ("brush", "/b/ /r/ /u/ /sh/"),
];

const PHONEME_BLENDING: [(&str, &str); 10] = [
    ("/s/ /i/ /t/", "sit"),
    ("/m/ /a/ /p/", "map"),
    ("/r/ /u/ /n/", "run"),
    ("/f/ /l/ /a/ /g/", "flag"),
    ("/s/ /t/ /o/ /p/", "stop"),
    ("/g/ /r/ /a/ /b/", "grab"),
    ("/s/ /p/ /l/ /i/ /t/", "split"),
    ("/s/ /t/ /r/ /i/ /p/", "strip"),
    ("/sh/ /r/ /i/ /m/ /p/", "shrimp"),
    ("/s/ /k/ /u/ /n/ /k/", "skunk"),
];

const FIRST_SOUNDS: [(&str, &str); 10] = [
    ("ball", "/b/"),
    ("dog", "/d/"),
    ("fun", "/f/"),
    ("goat", "/g/"),
    ("hat", "/h/"),
    ("kite", "/k/"),
    ("lamp", "/l/"),
    ("nose", "/n/"),
    ("rain", "/r/"),
    ("sun", "/s/"),
];

const CONTINUOUS_PHONEME_BLENDING: [(&str, &str); 10] = [
    ("/mmm/ /aaa/ /t/", "mat"),
    ("/sss/ /aaa/ /d/", "sad"),
    ("/fff/ /iii/ /n/", "fin"),
    ("/rrr/ /uuu/ /g/", "rug"),
    ("/lll/ /aaa/ /p/", "lap"),
    ("/mmm/ /ooo/ /p/", "mop"),
    ("/nnn/ /eee/ /t/", "net"),
    ("/sss/ /uuu/ /n/", "sun"),
    ("/fff/ /aaa/ /n/", "fan"),
    ("/rrr/ /eee/ /d/", "red"),
];

const PHONEME_DELETION: [(&str, &str); 10] = [
    ("Say \"mat\" without /m/", "at"),
    ("Say \"stop\" without /s/", "top"),
    ("Say \"blend\" without /b/", "lend"),
    ("Say \"slip\" without /s/", "lip"),
    ("Say \"cart\" without /k/", "art"),
    ("Say \"frog\" without /f/", "rog"),
    ("Say \"spin\" without /p/", "sin"),
    ("Say \"plank\" without /l/", "pank"),
    ("Say \"stripe\" without /r/", "stipe"),
    ("Say \"clam\" without /l/", "cam"),
];

const PHONEME_ADDITION: [(&str, &str); 10] = [
    ("Add /s/ to \"top\"", "stop"),
    ("Add /b/ to \"ring\"", "bring"),
    ("Add /s/ to \"lip\"", "slip"),
    ("Add /t/ to \"rail\"", "trail"),
    ("Add /k/ to \"lap\"", "clap"),
    ("Add /p/ to \"lay\"", "play"),
    ("Add /g/ to \"row\"", "grow"),
    ("Add /s/ to \"nail\"", "snail"),
    ("Add /f/ to \"lock\"", "flock"),
    ("Add /s/ to \"wing\"", "swing"),
];

const PHONEME_SUBSTITUTION: [(&str, &str); 10] = [
    ("Change /m/ in \"mat\" to /b/", "bat"),
    ("Change /s/ in \"sit\" to /f/", "fit"),
    ("Change /d/ in \"dog\" to /l/", "log"),
    ("Change /k/ in \"cap\" to /m/", "map"),
    ("Change /h/ in \"hot\" to /p/", "pot"),
    ("Change /r/ in \"run\" to /s/", "sun"),
    ("Change /b/ in \"big\" to /d/", "dig"),
    ("Change /t/ in \"tip\" to /s/", "sip"),
    ("Change /g/ in \"game\" to /n/", "name"),
    ("Change /p/ in \"pin\" to /w/", "win"),
];

/// Prompts and expected answers for a phoneme target. Targets without a
/// bank get numbered placeholder items.
pub fn item_bank(target: &str) -> Vec<PhonemeItem> {
    let bank: Option<&[(&str, &str)]> = match target {
        "PHONEME_SEGMENTATION" => Some(&PHONEME_SEGMENTATION[..]),
        "PHONEME_BLENDING" => Some(&PHONEME_BLENDING[..]),
        "FIRST_SOUNDS" => Some(&FIRST_SOUNDS[..]),
        "CONTINUOUS_PHONEME_BLENDING" => Some(&CONTINUOUS_PHONEME_BLENDING[..]),
        "PHONEME_DELETION" => Some(&PHONEME_DELETION[..]),
        "PHONEME_ADDITION" => Some(&PHONEME_ADDITION[..]),
        "PHONEME_SUBSTITUTION" => Some(&PHONEME_SUBSTITUTION[..]),
        _ => None,
    };
    match bank {
        Some(items) => items
            .iter()
            .map(|(prompt, answer)| PhonemeItem {
                prompt: (*prompt).to_string(),
                answer: (*answer).to_string(),
            })
            .collect(),
        None => (1..=DEFAULT_ITEM_COUNT)
            .map(|i| PhonemeItem {
                prompt: format!("Item {i}"),
                answer: String::new(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallyResult {
    pub score: u32,
    pub max: u32,
}

pub struct PhonemeScorer {
    target: String,
    items: Vec<PhonemeItem>,
    max_per_item: u32,
    scores: BTreeMap<usize, u32>,
}

impl PhonemeScorer {
    pub fn new(target: impl Into<String>, items: Vec<PhonemeItem>, max_per_item: u32) -> Self {
        Self {
            target: target.into(),
            items,
            max_per_item,
            scores: BTreeMap::new(),
        }
    }

    /// One point per item from the target's item bank.
    pub fn for_target(target: &str) -> Self {
        Self::new(target, item_bank(target), 1)
    }

    pub fn items(&self) -> &[PhonemeItem] {
        &self.items
    }

    pub fn score(&self, index: usize) -> Option<u32> {
        self.scores.get(&index).copied()
    }

    pub fn set_score(&mut self, index: usize, value: u32) -> Result<(), MarkingError> {
        if index >= self.items.len() {
            return Err(MarkingError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        if value > self.max_per_item {
            return Err(MarkingError::ValueOutOfRange {
                field: format!("{} item {}", self.target, index + 1),
                value,
                max: self.max_per_item,
            });
        }
        self.scores.insert(index, value);
        Ok(())
    }

    pub fn result(&self) -> TallyResult {
        TallyResult {
            score: self.scores.values().sum(),
            max: self.items.len() as u32 * self.max_per_item,
        }
    }

    pub fn score_entry(&self) -> ScoreEntry {
        let r = self.result();
        ScoreEntry::new(self.target.clone(), r.score).with_max(r.max)
    }
}

// ---------------------------------------------------------------------------
// Comprehension questions
// ---------------------------------------------------------------------------

pub const QUESTIONS_TARGET: &str = "NLM_QUESTIONS";

pub const FACTUAL_QUESTIONS: [&str; 7] = [
    "Who was the main character?",
    "Where was the character?",
    "What was the problem?",
    "How did the character feel about the problem?",
    "What did the character do to solve the problem?",
    "How did the story end?",
    "What did you learn? (expository)",
];

pub const VOCABULARY_ITEMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceKind {
    Text,
    Elaborative,
}

pub const REASONING_QUESTIONS: [(InferenceKind, &str); 3] = [
    (
        InferenceKind::Text,
        "Why do you think the character did that?",
    ),
    (
        InferenceKind::Text,
        "What might happen next based on the story?",
    ),
    (
        InferenceKind::Elaborative,
        "Using what you know, why might this be true?",
    ),
];

/// Inferential vocabulary outcome. The secondary question is only asked
/// when the primary answer was wrong, so it can score at most 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyResponse {
    PrimaryComplete,
    PrimaryPartial,
    SecondaryCorrect,
    #[default]
    Incorrect,
}

impl VocabularyResponse {
    pub fn points(self) -> u32 {
        match self {
            VocabularyResponse::PrimaryComplete => 3,
            VocabularyResponse::PrimaryPartial => 2,
            VocabularyResponse::SecondaryCorrect => 1,
            VocabularyResponse::Incorrect => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningResponse {
    /// 0-2 for the inference itself.
    #[serde(default)]
    pub main: u32,
    /// 0-1 for the justification.
    #[serde(default)]
    pub why: u32,
}

/// Examiner judgments for the question set. Missing items score 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionJudgments {
    #[serde(default)]
    pub factual: Vec<u32>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyResponse>,
    #[serde(default)]
    pub reasoning: Vec<ReasoningResponse>,
}

fn check(field: String, value: u32, max: u32) -> Result<(), MarkingError> {
    if value > max {
        return Err(MarkingError::ValueOutOfRange { field, value, max });
    }
    Ok(())
}

fn check_len(len: usize, expected: usize) -> Result<(), MarkingError> {
    if len > expected {
        return Err(MarkingError::IndexOutOfRange {
            index: len - 1,
            len: expected,
        });
    }
    Ok(())
}

impl QuestionJudgments {
    pub fn set_factual(&mut self, index: usize, value: u32) -> Result<(), MarkingError> {
        check_len(index + 1, FACTUAL_QUESTIONS.len())?;
        check(format!("factual {}", index + 1), value, 2)?;
        if self.factual.len() <= index {
            self.factual.resize(index + 1, 0);
        }
        self.factual[index] = value;
        Ok(())
    }

    pub fn set_vocabulary(
        &mut self,
        index: usize,
        response: VocabularyResponse,
    ) -> Result<(), MarkingError> {
        check_len(index + 1, VOCABULARY_ITEMS)?;
        if self.vocabulary.len() <= index {
            self.vocabulary.resize(index + 1, VocabularyResponse::default());
        }
        self.vocabulary[index] = response;
        Ok(())
    }

    pub fn set_reasoning(&mut self, index: usize, main: u32, why: u32) -> Result<(), MarkingError> {
        check_len(index + 1, REASONING_QUESTIONS.len())?;
        let response = ReasoningResponse { main, why };
        validate_reasoning(index, &response)?;
        if self.reasoning.len() <= index {
            self.reasoning.resize(index + 1, ReasoningResponse::default());
        }
        self.reasoning[index] = response;
        Ok(())
    }

    /// Check item counts and per-item ranges.
    pub fn validate(&self) -> Result<(), MarkingError> {
        check_len(self.factual.len(), FACTUAL_QUESTIONS.len())?;
        check_len(self.vocabulary.len(), VOCABULARY_ITEMS)?;
        check_len(self.reasoning.len(), REASONING_QUESTIONS.len())?;
        for (i, v) in self.factual.iter().enumerate() {
            check(format!("factual {}", i + 1), *v, 2)?;
        }
        for (i, r) in self.reasoning.iter().enumerate() {
            validate_reasoning(i, r)?;
        }
        Ok(())
    }
}

fn validate_reasoning(index: usize, r: &ReasoningResponse) -> Result<(), MarkingError> {
    check(format!("reasoning {} main", index + 1), r.main, 2)?;
    check(format!("reasoning {} why", index + 1), r.why, 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub factual: u32,
    pub factual_max: u32,
    pub vocabulary: u32,
    pub vocabulary_max: u32,
    pub reasoning: u32,
    pub reasoning_max: u32,
    pub total: u32,
}

pub fn score_questions(judgments: &QuestionJudgments) -> Result<QuestionScore, MarkingError> {
    judgments.validate()?;
    let factual = judgments.factual.iter().sum();
    let vocabulary = judgments.vocabulary.iter().map(|r| r.points()).sum();
    let reasoning = judgments.reasoning.iter().map(|r| r.main + r.why).sum();
    Ok(QuestionScore {
        factual,
        factual_max: FACTUAL_QUESTIONS.len() as u32 * 2,
        vocabulary,
        vocabulary_max: VOCABULARY_ITEMS as u32 * 3,
        reasoning,
        reasoning_max: REASONING_QUESTIONS.len() as u32 * 3,
        total: factual + vocabulary + reasoning,
    })
}

impl QuestionScore {
    pub fn score_entries(&self) -> Vec<ScoreEntry> {
        vec![
            ScoreEntry::new(QUESTIONS_TARGET, self.total).with_max(
                self.factual_max + self.vocabulary_max + self.reasoning_max,
            ),
            ScoreEntry::new(QUESTIONS_TARGET, self.factual)
                .with_sub_target("FACTUAL")
                .with_max(self.factual_max),
            ScoreEntry::new(QUESTIONS_TARGET, self.vocabulary)
                .with_sub_target("INFERENTIAL_VOCABULARY")
                .with_max(self.vocabulary_max),
            ScoreEntry::new(QUESTIONS_TARGET, self.reasoning)
                .with_sub_target("INFERENTIAL_REASONING")
                .with_max(self.reasoning_max),
        ]
    }
}
