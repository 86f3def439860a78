//! The `readscore subtests` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use readscore_core::model::{Grade, SubtestId};

pub fn execute(grade: Option<String>) -> Result<()> {
    let grade = grade
        .map(|g| g.parse::<Grade>())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Category", "Grades", "Targets"]);

    let mut shown = 0;
    for id in SubtestId::ALL {
        if grade.is_some_and(|g| !id.is_eligible(g)) {
            continue;
        }
        let info = id.info();
        table.add_row(vec![
            Cell::new(info.id),
            Cell::new(info.name),
            Cell::new(info.category),
            Cell::new(info.grades.join(", ")),
            Cell::new(info.targets.join("\n")),
        ]);
        shown += 1;
    }

    match grade {
        Some(g) if shown == 0 => println!("No subtests are given at grade {g}."),
        _ => println!("{table}"),
    }

    Ok(())
}
