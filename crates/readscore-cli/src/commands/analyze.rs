//! The `readscore analyze` command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table};

use readscore_providers::{create_services, load_config_from};

pub async fn execute(
    transcript: PathBuf,
    session: Option<u64>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(&transcript)
        .with_context(|| format!("failed to read transcript: {}", transcript.display()))?;
    if text.trim().is_empty() {
        bail!("transcript {} is empty", transcript.display());
    }

    let config = load_config_from(config.as_deref())?;
    let services = create_services(&config)?;
    let service = services.analysis.name().to_string();

    // Remote analysis reads the transcript stored with the session.
    let session_id = match (service.as_str(), session) {
        ("backend", None) => bail!("analysis service 'backend' needs --session <id>"),
        ("backend", Some(id)) => {
            services
                .persistence
                .save_transcript(id, &text)
                .await
                .context("failed to save transcript")?;
            id
        }
        (_, id) => id.unwrap_or_default(),
    };

    tracing::info!(service = %service, session_id, "analyzing transcript");
    let analysis = services
        .analysis
        .analyze(session_id, &text)
        .await
        .with_context(|| format!("analysis service '{service}' failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!(
        "Transcript: {} words, {} sentences",
        analysis.word_count, analysis.sentence_count
    );

    if analysis.is_empty() {
        println!("No retell score: '{service}' returned no sub-scores for this transcript.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Key", "Dimension", "Score", "Max", "Detail"]);
    for (key, sub) in &analysis.sub_scores {
        table.add_row(vec![
            Cell::new(key),
            Cell::new(&sub.label),
            Cell::new(sub.score),
            Cell::new(sub.max),
            Cell::new(&sub.detail),
        ]);
    }
    println!("{table}");
    println!(
        "Retell score: {}/{} ({service})",
        analysis.total_retell_score, analysis.max_retell_score
    );

    Ok(())
}
