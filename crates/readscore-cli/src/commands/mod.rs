pub mod analyze;
pub mod init;
pub mod questions;
pub mod replay;
pub mod retell;
pub mod subtests;
pub mod validate;

use comfy_table::{Cell, Table};

use readscore_core::model::ScoreEntry;

/// Table of the entries a result would record.
pub(crate) fn entries_table(entries: &[ScoreEntry]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Target", "Sub-target", "Score", "Max"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.target),
            Cell::new(entry.sub_target.as_deref().unwrap_or("-")),
            Cell::new(entry.raw_score),
            Cell::new(
                entry
                    .max_score
                    .map_or_else(|| "-".to_string(), |m| m.to_string()),
            ),
        ]);
    }
    table
}
