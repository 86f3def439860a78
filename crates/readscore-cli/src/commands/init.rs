//! The `readscore init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("readscore.toml").exists() {
        println!("readscore.toml already exists, skipping.");
    } else {
        std::fs::write("readscore.toml", SAMPLE_CONFIG)?;
        println!("Created readscore.toml");
    }

    std::fs::create_dir_all("sheets")?;
    let example_path = std::path::Path::new("sheets/example-retell.toml");
    if example_path.exists() {
        println!("sheets/example-retell.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_RETELL_SHEET)?;
        println!("Created sheets/example-retell.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit readscore.toml with your backend URL and token");
    println!("  2. Run: readscore validate --input sheets");
    println!("  3. Run: readscore retell --input sheets/example-retell.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# readscore configuration

timeout_secs = 120
academic_year = "2025-2026"

[backend]
base_url = "http://localhost:8000/api"
api_token = "${READSCORE_API_TOKEN}"

# Speech-to-text: "backend", "whisper", or "none".
[transcription]
type = "backend"

# [transcription]
# type = "whisper"
# api_key = "${READSCORE_OPENAI_KEY}"
# model = "whisper-1"

# Narrative analysis: "heuristic" runs locally, "backend" uses the server.
[analysis]
type = "heuristic"
"#;

const EXAMPLE_RETELL_SHEET: &str = r#"[sheet]
kind = "retell"
id = "example-retell"
grade = "2"

# 0 = absent, 1 = partial, 2 = complete
[judgments.ndc]
character = 2
setting = 1
problem = 2
feeling1 = 1
plan = 0
attempt = 2
complication = 1
feeling2 = 0
plan2 = 0
attempt2 = 0

# Uses of each conjunction family; up to 3 earn credit.
[judgments.conjunctions]
because_so = 2
when_while = 1

[judgments]
expository = []
vocabulary = ["pleased"]

[[judgments.custom_words]]
text = "gigantic"
checked = true
"#;
