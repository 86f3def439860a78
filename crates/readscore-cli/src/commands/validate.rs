//! The `readscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

use readscore_core::parser::{load_sheets, validate_sheets, SheetDocument};

pub fn execute(input: PathBuf) -> Result<()> {
    let loaded = load_sheets(&input)?;

    for (path, sheet) in &loaded {
        println!("{} {}: {}", sheet.kind(), sheet.id(), path.display());
    }

    let sheets: Vec<SheetDocument> = loaded.into_iter().map(|(_, sheet)| sheet).collect();
    let warnings = validate_sheets(&sheets);
    for w in &warnings {
        println!("  [{}] WARNING: {}", w.sheet_id, w.message);
    }

    if warnings.is_empty() {
        println!("All {} sheet(s) valid.", sheets.len());
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
