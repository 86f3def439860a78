//! Core data model types for readscore.
//!
//! Grades, testing windows, the subtest catalog, score entries, and the
//! audio/transcript artifacts produced during one subtest administration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student's grade level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Grade {
    PreK,
    Kindergarten,
    Numbered(u8),
}

impl Grade {
    /// Numeric grade; PreK and K both count as 0.
    pub fn numeric(&self) -> u8 {
        match self {
            Grade::PreK | Grade::Kindergarten => 0,
            Grade::Numbered(n) => *n,
        }
    }

    /// Grades 3 and up retell two-episode stories.
    pub fn is_dual_episode(&self) -> bool {
        self.numeric() >= 3
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::PreK => write!(f, "PreK"),
            Grade::Kindergarten => write!(f, "K"),
            Grade::Numbered(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prek" | "pre-k" | "pk" => Ok(Grade::PreK),
            "k" | "kindergarten" => Ok(Grade::Kindergarten),
            other => match other.parse::<u8>() {
                Ok(n) if (1..=12).contains(&n) => Ok(Grade::Numbered(n)),
                _ => Err(format!("unknown grade: {s}")),
            },
        }
    }
}

impl TryFrom<String> for Grade {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Grade> for String {
    fn from(grade: Grade) -> Self {
        grade.to_string()
    }
}

/// Testing window within the academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Period {
    Boy,
    Moy,
    Eoy,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Boy => write!(f, "BOY"),
            Period::Moy => write!(f, "MOY"),
            Period::Eoy => write!(f, "EOY"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BOY" => Ok(Period::Boy),
            "MOY" => Ok(Period::Moy),
            "EOY" => Ok(Period::Eoy),
            other => Err(format!("unknown testing period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    #[default]
    Benchmark,
    ProgressMonitoring,
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentType::Benchmark => write!(f, "benchmark"),
            AssessmentType::ProgressMonitoring => write!(f, "progress_monitoring"),
        }
    }
}

/// Subtest family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubtestCategory {
    Nlm,
    Ddm,
}

/// The administrable subtests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtestId {
    NlmListening,
    NlmReading,
    DdmPa,
    DdmPm,
    DdmOm,
    DdmDi,
}

/// Static description of a subtest.
#[derive(Debug, Clone, Serialize)]
pub struct SubtestInfo {
    pub id: SubtestId,
    pub name: &'static str,
    pub category: SubtestCategory,
    pub grades: &'static [&'static str],
    pub targets: &'static [&'static str],
}

impl SubtestId {
    pub const ALL: [SubtestId; 6] = [
        SubtestId::NlmListening,
        SubtestId::NlmReading,
        SubtestId::DdmPa,
        SubtestId::DdmPm,
        SubtestId::DdmOm,
        SubtestId::DdmDi,
    ];

    pub fn info(&self) -> SubtestInfo {
        match self {
            SubtestId::NlmListening => SubtestInfo {
                id: *self,
                name: "NLM Listening",
                category: SubtestCategory::Nlm,
                grades: &["PreK", "K", "1", "2", "3"],
                targets: &["NLM_RETELL", "NLM_QUESTIONS"],
            },
            SubtestId::NlmReading => SubtestInfo {
                id: *self,
                name: "NLM Reading",
                category: SubtestCategory::Nlm,
                grades: &["1", "2", "3", "4", "5", "6", "7", "8"],
                targets: &["NLM_RETELL", "NLM_QUESTIONS", "DECODING_FLUENCY"],
            },
            SubtestId::DdmPa => SubtestInfo {
                id: *self,
                name: "DDM Phonemic Awareness",
                category: SubtestCategory::Ddm,
                grades: &["PreK", "K", "1", "2"],
                targets: &[
                    "PHONEME_SEGMENTATION",
                    "PHONEME_BLENDING",
                    "FIRST_SOUNDS",
                    "CONTINUOUS_PHONEME_BLENDING",
                ],
            },
            SubtestId::DdmPm => SubtestInfo {
                id: *self,
                name: "DDM Phoneme Manipulation",
                category: SubtestCategory::Ddm,
                grades: &["1", "2"],
                targets: &[
                    "PHONEME_DELETION",
                    "PHONEME_ADDITION",
                    "PHONEME_SUBSTITUTION",
                ],
            },
            SubtestId::DdmOm => SubtestInfo {
                id: *self,
                name: "DDM Orthographic Mapping",
                category: SubtestCategory::Ddm,
                grades: &["PreK", "K", "1", "2"],
                targets: &["IRREGULAR_WORDS", "LETTER_SOUNDS", "LETTER_NAMES"],
            },
            SubtestId::DdmDi => SubtestInfo {
                id: *self,
                name: "DDM Decoding Inventory",
                category: SubtestCategory::Ddm,
                grades: &["K", "1", "2", "3", "4"],
                targets: &[
                    "CLOSED_SYLLABLES",
                    "VCE",
                    "BASIC_AFFIXES",
                    "VOWEL_TEAMS",
                    "VOWEL_R_CONTROLLED",
                    "ADVANCED_AFFIXES",
                    "COMPLEX_VOWELS",
                    "ADVANCED_WORD_FORMS",
                ],
            },
        }
    }

    /// Whether a student in `grade` may take this subtest.
    pub fn is_eligible(&self, grade: Grade) -> bool {
        let label = grade.to_string();
        self.info().grades.contains(&label.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtestId::NlmListening => "NLM_LISTENING",
            SubtestId::NlmReading => "NLM_READING",
            SubtestId::DdmPa => "DDM_PA",
            SubtestId::DdmPm => "DDM_PM",
            SubtestId::DdmOm => "DDM_OM",
            SubtestId::DdmDi => "DDM_DI",
        }
    }
}

impl fmt::Display for SubtestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SubtestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubtestCategory::Nlm => "NLM",
            SubtestCategory::Ddm => "DDM",
        })
    }
}

/// One `{target, raw_score}` pair handed to the persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_target: Option<String>,
    pub raw_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ScoreEntry {
    pub fn new(target: impl Into<String>, raw_score: u32) -> Self {
        Self {
            target: target.into(),
            sub_target: None,
            raw_score: f64::from(raw_score),
            max_score: None,
            notes: None,
        }
    }

    pub fn with_sub_target(mut self, sub_target: impl Into<String>) -> Self {
        self.sub_target = Some(sub_target.into());
        self
    }

    pub fn with_max(mut self, max: u32) -> Self {
        self.max_score = Some(f64::from(max));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Request to open an examination session for one student and subtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub student_id: u64,
    pub subtest: SubtestId,
    #[serde(rename = "grade_at_test")]
    pub grade: Grade,
    pub academic_year: String,
    #[serde(rename = "time_of_year")]
    pub period: Period,
    #[serde(default)]
    pub assessment_type: AssessmentType,
}

/// A session as acknowledged by the persistence service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    pub student_id: u64,
    pub subtest: SubtestId,
    #[serde(default)]
    pub is_complete: bool,
}

/// A stimulus story for oral reading or retell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub title: String,
    pub text: String,
}

/// Stimulus for a DDM target, distinguished by its data shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DdmStimulus {
    Grid(Vec<Vec<String>>),
    WordList(Vec<String>),
    Passage(String),
}

/// A finalised audio recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRecording {
    pub id: Uuid,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub mime_type: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub recorded_at: DateTime<Utc>,
}

impl AudioRecording {
    pub fn file_name(&self) -> String {
        let ext = match self.mime_type.as_str() {
            "audio/wav" => "wav",
            "audio/webm" => "webm",
            _ => "bin",
        };
        format!("recording-{}.{ext}", self.id)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Where the current transcript text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Live,
    Manual,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub source: TranscriptSource,
}

impl Transcript {
    pub fn new(text: impl Into<String>, source: TranscriptSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// One labelled sub-score of an automated narrative analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub label: String,
    pub score: u32,
    pub max: u32,
    #[serde(default)]
    pub detail: String,
}

/// Result of an automated narrative analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NarrativeAnalysis {
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub sentence_count: u32,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, SubScore>,
    #[serde(default)]
    pub total_retell_score: u32,
    #[serde(default)]
    pub max_retell_score: u32,
}

impl NarrativeAnalysis {
    /// An analysis with no sub-scores carries nothing to record.
    pub fn is_empty(&self) -> bool {
        self.sub_scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_parse_and_display() {
        assert_eq!("PreK".parse::<Grade>().unwrap(), Grade::PreK);
        assert_eq!("k".parse::<Grade>().unwrap(), Grade::Kindergarten);
        assert_eq!("3".parse::<Grade>().unwrap(), Grade::Numbered(3));
        assert!("13".parse::<Grade>().is_err());
        assert!("first".parse::<Grade>().is_err());
        assert_eq!(Grade::Kindergarten.to_string(), "K");
        assert_eq!(Grade::Numbered(7).to_string(), "7");
    }

    #[test]
    fn dual_episode_starts_at_grade_three() {
        assert!(!Grade::PreK.is_dual_episode());
        assert!(!Grade::Kindergarten.is_dual_episode());
        assert!(!Grade::Numbered(2).is_dual_episode());
        assert!(Grade::Numbered(3).is_dual_episode());
        assert!(Grade::Numbered(8).is_dual_episode());
    }

    #[test]
    fn subtest_eligibility() {
        assert!(SubtestId::NlmListening.is_eligible(Grade::PreK));
        assert!(!SubtestId::NlmReading.is_eligible(Grade::Kindergarten));
        assert!(SubtestId::DdmDi.is_eligible(Grade::Numbered(4)));
        assert!(!SubtestId::DdmPm.is_eligible(Grade::Numbered(3)));
    }

    #[test]
    fn ddm_stimulus_shapes() {
        let grid: DdmStimulus = serde_json::from_str(r#"[["a","b"],["c","d"]]"#).unwrap();
        assert!(matches!(grid, DdmStimulus::Grid(rows) if rows.len() == 2));

        let list: DdmStimulus = serde_json::from_str(r#"["cat","dog"]"#).unwrap();
        assert!(matches!(list, DdmStimulus::WordList(words) if words.len() == 2));

        let passage: DdmStimulus = serde_json::from_str(r#""The stodrun ran.""#).unwrap();
        assert!(matches!(passage, DdmStimulus::Passage(_)));
    }

    #[test]
    fn new_session_wire_names() {
        let session = NewSession {
            student_id: 12,
            subtest: SubtestId::NlmReading,
            grade: Grade::Numbered(2),
            academic_year: "2025-2026".into(),
            period: Period::Moy,
            assessment_type: AssessmentType::Benchmark,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["subtest"], "NLM_READING");
        assert_eq!(json["grade_at_test"], "2");
        assert_eq!(json["time_of_year"], "MOY");
        assert_eq!(json["assessment_type"], "benchmark");
    }

    #[test]
    fn score_entry_omits_unset_fields() {
        let entry = ScoreEntry::new("NLM_RETELL", 31).with_sub_target("NDC");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["raw_score"], 31.0);
        assert_eq!(json["sub_target"], "NDC");
        assert!(json.get("max_score").is_none());
    }
}
