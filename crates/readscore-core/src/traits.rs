//! Collaborator traits.
//!
//! The engine scores and orchestrates; storage, stimulus delivery,
//! transcription, and analysis are reached through these async traits.
//! Concrete implementations live in `readscore-providers`, and the
//! [`Recorder`] implementation lives in `readscore-capture`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, ServiceError};
use crate::model::{
    AssessmentType, AudioRecording, DdmStimulus, Grade, NarrativeAnalysis, NewSession, Period,
    ScoreEntry, SessionRecord, Story,
};

// ---------------------------------------------------------------------------
// Stimulus
// ---------------------------------------------------------------------------

/// Source of passages, word grids, and item lists.
#[async_trait]
pub trait StimulusProvider: Send + Sync {
    /// Stories for a grade and testing window, in administration order.
    async fn stories(
        &self,
        grade: Grade,
        period: Period,
        assessment_type: AssessmentType,
    ) -> Result<Vec<Story>, ServiceError>;

    /// Grid, word list, or passage for a DDM target.
    async fn ddm_stimulus(&self, target: &str) -> Result<DdmStimulus, ServiceError>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// A score entry as stored by the persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScore {
    pub id: u64,
    #[serde(flatten)]
    pub entry: ScoreEntry,
}

/// Long-term storage of sessions, scores, audio, and transcripts.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn start_session(&self, session: &NewSession) -> Result<SessionRecord, ServiceError>;

    async fn add_scores(
        &self,
        session_id: u64,
        entries: &[ScoreEntry],
    ) -> Result<Vec<StoredScore>, ServiceError>;

    async fn edit_score(
        &self,
        session_id: u64,
        score_id: u64,
        entry: &ScoreEntry,
    ) -> Result<StoredScore, ServiceError>;

    async fn complete_session(&self, session_id: u64) -> Result<(), ServiceError>;

    async fn upload_audio(
        &self,
        session_id: u64,
        recording: &AudioRecording,
    ) -> Result<(), ServiceError>;

    async fn save_transcript(&self, session_id: u64, transcript: &str)
        -> Result<(), ServiceError>;
}

// ---------------------------------------------------------------------------
// Transcription and analysis
// ---------------------------------------------------------------------------

/// Result of a post-hoc transcription request.
///
/// `auto_transcribed == false` is a normal outcome: the examiner types the
/// transcript by hand, guided by `message`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranscriptionOutcome {
    #[serde(default)]
    pub transcript: Option<String>,
    pub auto_transcribed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl TranscriptionOutcome {
    pub fn transcribed(text: impl Into<String>) -> Self {
        Self {
            transcript: Some(text.into()),
            auto_transcribed: true,
            message: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            transcript: None,
            auto_transcribed: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe an uploaded recording.
    async fn transcribe(
        &self,
        session_id: u64,
        recording: &AudioRecording,
    ) -> Result<TranscriptionOutcome, ServiceError>;
}

/// Automated narrative analysis standing in for human retell scoring.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        session_id: u64,
        transcript: &str,
    ) -> Result<NarrativeAnalysis, ServiceError>;
}

// ---------------------------------------------------------------------------
// Audio capture
// ---------------------------------------------------------------------------

/// Audio handed back when a capture stops.
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub recording: AudioRecording,
    /// Final live-recognition text, if live transcription ran.
    pub live_transcript: Option<String>,
    /// Live recognition stopped before the recording did, so
    /// `live_transcript` is incomplete.
    pub live_partial: bool,
}

/// A microphone capture with optional live transcription.
#[async_trait]
pub trait Recorder: Send {
    /// Acquire the microphone and begin buffering audio.
    async fn start(&mut self, live_transcription: bool) -> Result<(), CaptureError>;

    /// Stop capturing, release every device, and finalise the recording.
    async fn stop(&mut self) -> Result<CapturedAudio, CaptureError>;

    /// Tear down the capture and discard everything buffered.
    async fn cancel(&mut self);

    fn is_recording(&self) -> bool;

    /// Finals plus the current interim fragment, for display while recording.
    fn live_preview(&self) -> String {
        String::new()
    }
}
