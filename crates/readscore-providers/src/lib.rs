//! readscore-providers: Service integrations.
//!
//! Implements the core collaborator traits against the assessment backend,
//! a Whisper-compatible transcription API, and a local heuristic analyzer,
//! plus in-memory mocks for tests.

pub mod backend;
pub mod config;
pub mod heuristic;
mod http;
pub mod mock;
pub mod whisper;

pub use backend::BackendClient;
pub use config::{
    create_services, load_config, load_config_from, AnalysisConfig, BackendConfig,
    ReadscoreConfig, ServiceSet, TranscriptionConfig,
};
pub use heuristic::HeuristicAnalyzer;
pub use mock::MockServices;
pub use whisper::WhisperTranscriber;
