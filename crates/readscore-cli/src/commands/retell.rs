//! The `readscore retell` command.

use std::path::PathBuf;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use readscore_core::model::{Grade, ScoreEntry};
use readscore_core::parser::{parse_sheet, SheetDocument};
use readscore_core::retell::{score_retell, RetellScore};

#[derive(Serialize)]
struct RetellOutput<'a> {
    id: &'a str,
    grade: Grade,
    score: RetellScore,
    entries: Vec<ScoreEntry>,
}

pub fn execute(input: PathBuf, json: bool) -> Result<()> {
    let doc = parse_sheet(&input)?;
    let kind = doc.kind();
    let SheetDocument::Retell(sheet) = doc else {
        bail!("{} is a {kind} sheet, not a retell sheet", input.display());
    };

    let score = score_retell(&sheet.judgments, sheet.grade);
    tracing::debug!(sheet = %sheet.id, total = score.total, "retell scored");

    if json {
        let output = RetellOutput {
            id: &sheet.id,
            grade: sheet.grade,
            score,
            entries: score.score_entries(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Retell: {} (grade {})", sheet.id, sheet.grade);
    println!(
        "Format: {}",
        if score.dual_episode {
            "two episodes"
        } else {
            "single episode"
        }
    );

    let mut table = Table::new();
    table.set_header(vec!["Dimension", "Score", "Max"]);
    let mut row = |name: &str, value: u32, max: Option<u32>| {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(value),
            Cell::new(max.map_or_else(|| "-".to_string(), |m| m.to_string())),
        ]);
    };
    row("Narrative Discourse (NDC)", score.ndc, Some(score.ndc_max));
    row("Sentence Complexity (SC)", score.sc, Some(score.sc_max));
    row("Expository Discourse (EDC)", score.edc, Some(score.edc_max));
    row("Vocabulary (VC)", score.vc, None);
    row("Episode 1 (EC1)", score.ec1, Some(score.ec1_max));
    if score.dual_episode {
        row("Episode 2 (EC2)", score.ec2, Some(score.ec2_max));
    }
    println!("{table}");
    println!("Total: {}", score.total);

    Ok(())
}
