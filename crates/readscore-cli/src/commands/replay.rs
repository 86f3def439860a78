//! The `readscore replay` command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table};

use readscore_core::parser::{parse_sheet, SheetDocument};
use readscore_core::replay::{replay, ReplayReport};

use super::entries_table;

pub fn execute(script: PathBuf, json: bool) -> Result<()> {
    let doc = parse_sheet(&script)?;
    let kind = doc.kind();
    let SheetDocument::Replay(replay_script) = doc else {
        bail!("{} is a {kind} sheet, not a replay script", script.display());
    };

    let report = replay(&replay_script)
        .with_context(|| format!("replay of {} failed", script.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &ReplayReport) {
    println!("Replay: {}", report.id);
    println!("Phase: {} after {:.1}s", report.phase, report.elapsed_secs);

    let mut table = Table::new();
    table.set_header(vec!["Measure", "Value"]);
    table.add_row(vec![Cell::new("Items reached"), Cell::new(report.result.words_read)]);
    table.add_row(vec![
        Cell::new("Errors in window"),
        Cell::new(report.result.errors_in_window),
    ]);
    table.add_row(vec![
        Cell::new("Errors marked"),
        Cell::new(report.result.total_errors),
    ]);
    table.add_row(vec![Cell::new("Score"), Cell::new(report.result.score)]);
    if let Some(fluency) = &report.fluency {
        table.add_row(vec![Cell::new("CWPM"), Cell::new(fluency.cwpm)]);
        table.add_row(vec![
            Cell::new("Accuracy"),
            Cell::new(format!("{}%", fluency.accuracy)),
        ]);
        table.add_row(vec![
            Cell::new("Prosody"),
            Cell::new(
                fluency
                    .prosody
                    .map_or_else(|| "not rated".to_string(), |p| p.to_string()),
            ),
        ]);
    }
    println!("{table}");

    if report.entries.is_empty() {
        println!("\nNot ready to submit.");
    } else {
        println!("\nEntries to record:");
        println!("{}", entries_table(&report.entries));
    }
}
