//! Error types for marking, capture, collaborator services, and orchestration.
//!
//! Everything here is locally recoverable: callers retry, re-record, or fall
//! back to manual entry. Nothing in the engine aborts an examination.

use thiserror::Error;

use crate::timing::{MarkingAction, MarkingPhase};

/// Errors raised by marking sessions and rubric scorers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkingError {
    /// The requested action is not allowed from the current phase.
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: MarkingPhase,
        action: MarkingAction,
    },

    /// An item index outside the stimulus was addressed.
    #[error("item index {index} out of range (item count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A timed grid was configured outside the allowed window.
    #[error("time limit {secs}s outside allowed range {min}..={max}s")]
    InvalidTimeLimit { secs: u64, min: u64, max: u64 },

    /// A rubric value exceeded the item's maximum.
    #[error("{field}: value {value} exceeds maximum {max}")]
    ValueOutOfRange {
        field: String,
        value: u32,
        max: u32,
    },

    /// The stimulus had no markable items.
    #[error("stimulus has no items")]
    EmptyStimulus,

    /// A timer reading that is not a representable number of seconds.
    #[error("invalid timer reading: {0}s")]
    InvalidTick(String),
}

/// Errors from the microphone and speech recognition devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The platform refused microphone access.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// The device could not be opened or vanished mid-capture.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    /// Live recognition is not available on this platform.
    #[error("speech recognition is not supported on this platform")]
    RecognitionUnsupported,

    /// The captured samples could not be encoded.
    #[error("failed to encode recording: {0}")]
    Encoding(String),
}

/// Errors from the external collaborators (persistence, stimulus,
/// transcription, analysis).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Returns `true` if retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthorized(_) | ServiceError::NotFound(_)
        )
    }
}

/// Errors surfaced by the narrative analysis orchestrator.
///
/// Every variant leaves the orchestrator in a phase from which the examiner
/// can retry or continue by hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Audio upload failed; the orchestrator stays in the record phase.
    #[error("audio upload failed: {0}")]
    Upload(ServiceError),

    /// Saving the transcript failed; analysis was not attempted.
    #[error("failed to save transcript: {0}")]
    TranscriptPersist(ServiceError),

    /// The analysis service failed; the transcript is still editable.
    #[error("analysis failed: {0}")]
    Analysis(ServiceError),

    #[error("no recording to upload")]
    NoRecording,

    #[error("transcript is empty")]
    EmptyTranscript,

    #[error("cannot {action} during the {phase} phase")]
    InvalidPhase { phase: String, action: &'static str },
}
