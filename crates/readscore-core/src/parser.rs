//! TOML scoring sheet parser.
//!
//! Loads retell sheets, question sheets, and replay scripts from TOML files
//! and directories, and validates them. Every file starts with a `[sheet]`
//! header whose `kind` selects the body layout.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::grid::DEFAULT_GRID_SECS;
use crate::model::Grade;
use crate::replay::{ReplayEvent, ReplayMode, ReplayScript};
use crate::retell::{NdcElement, RetellJudgments, MAX_CONJUNCTION_CREDIT, MAX_CUSTOM_WORDS};
use crate::tally::QuestionJudgments;

/// A retell judgment sheet for one student.
#[derive(Debug, Clone)]
pub struct RetellSheet {
    pub id: String,
    pub grade: Grade,
    pub judgments: RetellJudgments,
}

#[derive(Debug, Clone)]
pub struct QuestionSheet {
    pub id: String,
    pub judgments: QuestionJudgments,
}

/// Any parsed input file.
#[derive(Debug, Clone)]
pub enum SheetDocument {
    Retell(RetellSheet),
    Questions(QuestionSheet),
    Replay(ReplayScript),
}

impl SheetDocument {
    pub fn id(&self) -> &str {
        match self {
            SheetDocument::Retell(s) => &s.id,
            SheetDocument::Questions(s) => &s.id,
            SheetDocument::Replay(s) => &s.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SheetDocument::Retell(_) => "retell",
            SheetDocument::Questions(_) => "questions",
            SheetDocument::Replay(_) => "replay",
        }
    }
}

// ---------------------------------------------------------------------------
// Intermediate TOML structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlHeaderOnly {
    sheet: TomlSheetHeader,
}

#[derive(Debug, Deserialize)]
struct TomlSheetHeader {
    kind: String,
    id: String,
    #[serde(default)]
    grade: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlRetellFile {
    #[serde(default)]
    judgments: RetellJudgments,
}

#[derive(Debug, Deserialize)]
struct TomlQuestionFile {
    #[serde(default)]
    judgments: QuestionJudgments,
}

#[derive(Debug, Deserialize)]
struct TomlReplayFile {
    stimulus: TomlStimulus,
    #[serde(default)]
    events: Vec<ReplayEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TomlStimulus {
    Fluency {
        passage: String,
    },
    Grid {
        target: String,
        rows: Vec<Vec<String>>,
        #[serde(default = "default_grid_secs")]
        time_limit_secs: u64,
    },
}

fn default_grid_secs() -> u64 {
    DEFAULT_GRID_SECS
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a single TOML file.
pub fn parse_sheet(path: &Path) -> Result<SheetDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sheet file: {}", path.display()))?;

    parse_sheet_str(&content, path)
}

/// Parse TOML content (useful for testing).
pub fn parse_sheet_str(content: &str, source_path: &Path) -> Result<SheetDocument> {
    let header: TomlHeaderOnly = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    let TomlSheetHeader { kind, id, grade } = header.sheet;

    match kind.as_str() {
        "retell" => {
            let grade: Grade = grade
                .context("retell sheet needs a grade")?
                .parse()
                .map_err(|e: String| anyhow::anyhow!("{}", e))?;
            let body: TomlRetellFile = toml::from_str(content)
                .with_context(|| format!("invalid retell sheet: {}", source_path.display()))?;
            Ok(SheetDocument::Retell(RetellSheet {
                id,
                grade,
                judgments: body.judgments,
            }))
        }
        "questions" => {
            let body: TomlQuestionFile = toml::from_str(content)
                .with_context(|| format!("invalid question sheet: {}", source_path.display()))?;
            body.judgments
                .validate()
                .with_context(|| format!("invalid question sheet: {}", source_path.display()))?;
            Ok(SheetDocument::Questions(QuestionSheet {
                id,
                judgments: body.judgments,
            }))
        }
        "replay" => {
            let body: TomlReplayFile = toml::from_str(content)
                .with_context(|| format!("invalid replay script: {}", source_path.display()))?;
            let mode = match body.stimulus {
                TomlStimulus::Fluency { passage } => ReplayMode::Fluency { passage },
                TomlStimulus::Grid {
                    target,
                    rows,
                    time_limit_secs,
                } => ReplayMode::Grid {
                    target,
                    rows,
                    time_limit_secs,
                },
            };
            Ok(SheetDocument::Replay(ReplayScript {
                id,
                mode,
                events: body.events,
            }))
        }
        other => anyhow::bail!(
            "unknown sheet kind '{}' in {}",
            other,
            source_path.display()
        ),
    }
}

/// Load one file, or every `.toml` sheet under a directory. Files that
/// fail to parse are logged and skipped.
pub fn load_sheets(path: &Path) -> Result<Vec<(PathBuf, SheetDocument)>> {
    if path.is_file() {
        return Ok(vec![(path.to_path_buf(), parse_sheet(path)?)]);
    }
    load_sheet_directory(path)
}

/// Recursively load all `.toml` sheets from a directory.
pub fn load_sheet_directory(dir: &Path) -> Result<Vec<(PathBuf, SheetDocument)>> {
    let mut sheets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            sheets.extend(load_sheet_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_sheet(&path) {
                Ok(sheet) => sheets.push((path, sheet)),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sheets)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A warning from sheet validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub sheet_id: String,
    pub message: String,
}

/// Validate a set of sheets for common issues.
pub fn validate_sheets(sheets: &[SheetDocument]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for sheet in sheets {
        if !seen_ids.insert(sheet.id()) {
            warnings.push(ValidationWarning {
                sheet_id: sheet.id().to_string(),
                message: format!("duplicate sheet ID: {}", sheet.id()),
            });
        }
    }

    for sheet in sheets {
        let mut warn = |message: String| {
            warnings.push(ValidationWarning {
                sheet_id: sheet.id().to_string(),
                message,
            })
        };
        match sheet {
            SheetDocument::Retell(s) => validate_retell(s, &mut warn),
            SheetDocument::Questions(s) => {
                if s.judgments.factual.is_empty()
                    && s.judgments.vocabulary.is_empty()
                    && s.judgments.reasoning.is_empty()
                {
                    warn("no question judgments recorded".into());
                }
            }
            SheetDocument::Replay(s) => validate_replay(s, &mut warn),
        }
    }

    warnings
}

fn validate_retell(sheet: &RetellSheet, warn: &mut impl FnMut(String)) {
    let active = NdcElement::active(sheet.grade);
    for element in sheet.judgments.ndc.keys() {
        if !active.contains(element) {
            warn(format!(
                "NDC element '{}' is not scored at grade {} and will be ignored",
                element.label(),
                sheet.grade
            ));
        }
    }
    for (conjunction, count) in &sheet.judgments.conjunctions {
        if *count > MAX_CONJUNCTION_CREDIT {
            warn(format!(
                "'{}' counted {} times; only {} earn credit",
                conjunction.label(),
                count,
                MAX_CONJUNCTION_CREDIT
            ));
        }
    }
    if sheet.judgments.custom_words.len() > MAX_CUSTOM_WORDS {
        warn(format!(
            "{} custom words given; only the first {} are scored",
            sheet.judgments.custom_words.len(),
            MAX_CUSTOM_WORDS
        ));
    }
    for word in &sheet.judgments.custom_words {
        if word.checked && word.text.trim().is_empty() {
            warn("a checked custom word has no text".into());
        }
    }
}

fn validate_replay(script: &ReplayScript, warn: &mut impl FnMut(String)) {
    if script.events.is_empty() {
        warn("replay has no events".into());
        return;
    }
    if script.events.first() != Some(&ReplayEvent::Start) {
        warn("replay does not begin with a start event".into());
    }
    if let ReplayMode::Fluency { passage } = &script.mode {
        let has_prosody = script
            .events
            .iter()
            .any(|e| matches!(e, ReplayEvent::Prosody { .. }));
        if !has_prosody {
            warn("fluency replay has no prosody rating; result cannot be submitted".into());
        }
        if passage.split_whitespace().next().is_none() {
            warn("fluency passage is empty".into());
        }
    }
    let mut last_tick = 0.0;
    for event in &script.events {
        if let ReplayEvent::Tick { elapsed_secs } = event {
            if !elapsed_secs.is_finite() {
                warn(format!("tick at {elapsed_secs}s is not a finite time"));
                continue;
            }
            if *elapsed_secs < last_tick {
                warn(format!(
                    "tick at {elapsed_secs}s goes backwards from {last_tick}s"
                ));
            }
            last_tick = *elapsed_secs;
        }
    }
}
