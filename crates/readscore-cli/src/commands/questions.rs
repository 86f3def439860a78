//! The `readscore questions` command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use readscore_core::model::ScoreEntry;
use readscore_core::parser::{parse_sheet, SheetDocument};
use readscore_core::tally::{score_questions, QuestionScore};

#[derive(Serialize)]
struct QuestionOutput<'a> {
    id: &'a str,
    score: QuestionScore,
    entries: Vec<ScoreEntry>,
}

pub fn execute(input: PathBuf, json: bool) -> Result<()> {
    let doc = parse_sheet(&input)?;
    let kind = doc.kind();
    let SheetDocument::Questions(sheet) = doc else {
        bail!("{} is a {kind} sheet, not a question sheet", input.display());
    };

    let score = score_questions(&sheet.judgments)
        .with_context(|| format!("invalid judgments in {}", input.display()))?;

    if json {
        let output = QuestionOutput {
            id: &sheet.id,
            score,
            entries: score.score_entries(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Questions: {}", sheet.id);

    let mut table = Table::new();
    table.set_header(vec!["Section", "Score", "Max"]);
    table.add_row(vec![
        Cell::new("Factual"),
        Cell::new(score.factual),
        Cell::new(score.factual_max),
    ]);
    table.add_row(vec![
        Cell::new("Inferential vocabulary"),
        Cell::new(score.vocabulary),
        Cell::new(score.vocabulary_max),
    ]);
    table.add_row(vec![
        Cell::new("Inferential reasoning"),
        Cell::new(score.reasoning),
        Cell::new(score.reasoning_max),
    ]);
    println!("{table}");
    println!(
        "Total: {}/{}",
        score.total,
        score.factual_max + score.vocabulary_max + score.reasoning_max
    );

    Ok(())
}
