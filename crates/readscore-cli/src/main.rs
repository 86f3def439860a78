//! readscore CLI: score assessment sheets, replay timed marking, and
//! analyze retell transcripts from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "readscore", version, about = "Literacy assessment scoring toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a narrative retell judgment sheet
    Retell {
        /// Path to the retell sheet (.toml)
        #[arg(long)]
        input: PathBuf,

        /// Print the score as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a comprehension question sheet
    Questions {
        /// Path to the question sheet (.toml)
        #[arg(long)]
        input: PathBuf,

        /// Print the score as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a timed marking script through the marking session
    Replay {
        /// Path to the replay script (.toml)
        #[arg(long)]
        script: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a retell transcript
    Analyze {
        /// Path to a plain-text transcript
        #[arg(long)]
        transcript: PathBuf,

        /// Backend session ID (required when analysis runs on the backend)
        #[arg(long)]
        session: Option<u64>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate sheets and replay scripts
    Validate {
        /// Path to a sheet file or directory
        #[arg(long)]
        input: PathBuf,
    },

    /// List the subtest catalog
    Subtests {
        /// Only show subtests given at this grade (K, 1, 2, ...)
        #[arg(long)]
        grade: Option<String>,
    },

    /// Create starter config and example retell sheet
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("readscore=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Retell { input, json } => commands::retell::execute(input, json),
        Commands::Questions { input, json } => commands::questions::execute(input, json),
        Commands::Replay { script, json } => commands::replay::execute(script, json),
        Commands::Analyze {
            transcript,
            session,
            config,
            json,
        } => commands::analyze::execute(transcript, session, config, json).await,
        Commands::Validate { input } => commands::validate::execute(input),
        Commands::Subtests { grade } => commands::subtests::execute(grade),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
