//! Narrative analysis orchestration.
//!
//! Drives one retell recording through record, upload, transcribe, review,
//! analyze, and results. Every failure leaves the orchestrator in a phase
//! the examiner can retry from or continue by hand. Methods take
//! `&mut self`, so at most one network call is ever in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::model::{AudioRecording, NarrativeAnalysis, ScoreEntry, Transcript, TranscriptSource};
use crate::retell::RETELL_TARGET;
use crate::sheet::ScoreSheet;
use crate::traits::{AnalysisService, PersistenceService, Recorder, TranscriptionService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Record,
    Upload,
    Transcribe,
    Review,
    Analyze,
    Results,
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisPhase::Record => "record",
            AnalysisPhase::Upload => "upload",
            AnalysisPhase::Transcribe => "transcribe",
            AnalysisPhase::Review => "review",
            AnalysisPhase::Analyze => "analyze",
            AnalysisPhase::Results => "results",
        };
        f.write_str(name)
    }
}

/// How the transcript for review was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscribeOutcome {
    /// A live transcript was already present; transcription was skipped.
    LiveTranscriptKept,
    /// The transcription service produced the transcript.
    Transcribed,
    /// No automatic transcript; the examiner must type one.
    ManualEntryRequired { advisory: String },
}

/// The collaborators an orchestrator talks to.
#[derive(Clone)]
pub struct AnalysisServices {
    pub persistence: Arc<dyn PersistenceService>,
    /// `None` when no post-hoc transcription is configured.
    pub transcription: Option<Arc<dyn TranscriptionService>>,
    pub analysis: Arc<dyn AnalysisService>,
}

const NO_TRANSCRIPTION_ADVISORY: &str =
    "Automatic transcription is unavailable. Please type the transcript manually.";
const PARTIAL_LIVE_ADVISORY: &str =
    "Live transcription stopped early. Please complete the transcript manually.";

pub struct NarrativeAnalysisOrchestrator {
    session_id: u64,
    recorder: Box<dyn Recorder>,
    services: AnalysisServices,
    phase: AnalysisPhase,
    recording: Option<AudioRecording>,
    transcript: Option<Transcript>,
    /// The live transcript stopped before the recording did.
    live_partial: bool,
    analysis: Option<NarrativeAnalysis>,
    advisory: Option<String>,
}

impl NarrativeAnalysisOrchestrator {
    pub fn new(session_id: u64, recorder: Box<dyn Recorder>, services: AnalysisServices) -> Self {
        Self {
            session_id,
            recorder,
            services,
            phase: AnalysisPhase::Record,
            recording: None,
            transcript: None,
            live_partial: false,
            analysis: None,
            advisory: None,
        }
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    pub fn recording(&self) -> Option<&AudioRecording> {
        self.recording.as_ref()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn analysis(&self) -> Option<&NarrativeAnalysis> {
        self.analysis.as_ref()
    }

    /// The advisory from the last failed upload or transcription attempt.
    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn live_preview(&self) -> String {
        self.recorder.live_preview()
    }

    fn require(&self, allowed: &[AnalysisPhase], action: &'static str) -> Result<(), OrchestratorError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidPhase {
                phase: self.phase.to_string(),
                action,
            })
        }
    }

    fn enter(&mut self, phase: AnalysisPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "analysis phase");
        self.phase = phase;
    }

    // -- record -------------------------------------------------------------

    /// Start a new capture. Any earlier capture and its artifacts are torn
    /// down first.
    pub async fn start_recording(&mut self, live_transcription: bool) -> Result<(), OrchestratorError> {
        self.require(&[AnalysisPhase::Record, AnalysisPhase::Review], "start recording")?;
        self.discard().await;
        self.enter(AnalysisPhase::Record);
        self.recorder.start(live_transcription).await?;
        info!(session_id = self.session_id, live_transcription, "recording started");
        Ok(())
    }

    /// Stop the capture and keep the recording for upload.
    pub async fn stop_recording(&mut self) -> Result<Duration, OrchestratorError> {
        self.require(&[AnalysisPhase::Record], "stop recording")?;
        let captured = self.recorder.stop().await?;
        let duration = captured.recording.duration;
        self.transcript = captured
            .live_transcript
            .filter(|t| !t.trim().is_empty())
            .map(|t| Transcript::new(t, TranscriptSource::Live));
        self.live_partial = captured.live_partial;
        self.recording = Some(captured.recording);
        info!(
            session_id = self.session_id,
            duration_ms = duration.as_millis() as u64,
            live_words = self.transcript.as_ref().map_or(0, Transcript::word_count),
            "recording stopped"
        );
        Ok(duration)
    }

    /// Abandon everything and return to the record phase.
    pub async fn rerecord(&mut self) {
        self.discard().await;
        self.enter(AnalysisPhase::Record);
    }

    async fn discard(&mut self) {
        if self.recorder.is_recording() {
            self.recorder.cancel().await;
        }
        self.recording = None;
        self.transcript = None;
        self.live_partial = false;
        self.analysis = None;
        self.advisory = None;
    }

    // -- upload and transcribe ---------------------------------------------

    /// Upload the recording. On failure the orchestrator stays in the
    /// record phase with the recording kept for another attempt. A
    /// rejection that cannot succeed on retry advises manual entry.
    pub async fn upload(&mut self) -> Result<(), OrchestratorError> {
        self.require(&[AnalysisPhase::Record], "upload")?;
        let recording = self.recording.as_ref().ok_or(OrchestratorError::NoRecording)?;

        self.phase = AnalysisPhase::Upload;
        let uploaded = self
            .services
            .persistence
            .upload_audio(self.session_id, recording)
            .await;
        if let Err(e) = uploaded {
            warn!(
                session_id = self.session_id,
                error = %e,
                permanent = e.is_permanent(),
                "audio upload failed"
            );
            self.advisory = Some(if e.is_permanent() {
                format!("Audio upload was rejected ({e}). Please type the transcript manually.")
            } else {
                format!("Audio upload failed ({e}). Retry the upload or type the transcript manually.")
            });
            self.enter(AnalysisPhase::Record);
            return Err(OrchestratorError::Upload(e));
        }
        info!(session_id = self.session_id, "audio uploaded");
        self.advisory = None;
        self.enter(AnalysisPhase::Transcribe);
        Ok(())
    }

    /// Obtain a transcript for review. An unavailable or failing
    /// transcription service routes to manual entry rather than an error.
    ///
    /// A partial live transcript is replaced by the service's when one is
    /// produced, and otherwise kept for the examiner to complete.
    pub async fn transcribe(&mut self) -> Result<TranscribeOutcome, OrchestratorError> {
        self.require(&[AnalysisPhase::Transcribe], "transcribe")?;

        let has_live = self.transcript.as_ref().is_some_and(|t| !t.is_blank());
        if has_live && !self.live_partial {
            self.enter(AnalysisPhase::Review);
            return Ok(TranscribeOutcome::LiveTranscriptKept);
        }

        let outcome = match (&self.services.transcription, &self.recording) {
            (Some(service), Some(recording)) => {
                match service.transcribe(self.session_id, recording).await {
                    Ok(result) => match result.transcript.filter(|t| !t.trim().is_empty()) {
                        Some(text) if result.auto_transcribed => {
                            self.transcript =
                                Some(Transcript::new(text, TranscriptSource::Service));
                            self.live_partial = false;
                            TranscribeOutcome::Transcribed
                        }
                        _ => TranscribeOutcome::ManualEntryRequired {
                            advisory: result
                                .message
                                .unwrap_or_else(|| NO_TRANSCRIPTION_ADVISORY.to_string()),
                        },
                    },
                    Err(e) => {
                        warn!(service = service.name(), error = %e, "transcription failed");
                        TranscribeOutcome::ManualEntryRequired {
                            advisory: format!("Transcription failed ({e}). Please type the transcript manually."),
                        }
                    }
                }
            }
            _ => TranscribeOutcome::ManualEntryRequired {
                advisory: NO_TRANSCRIPTION_ADVISORY.to_string(),
            },
        };

        let outcome = match outcome {
            TranscribeOutcome::ManualEntryRequired { .. } if has_live => {
                TranscribeOutcome::ManualEntryRequired {
                    advisory: PARTIAL_LIVE_ADVISORY.to_string(),
                }
            }
            other => other,
        };
        self.advisory = match &outcome {
            TranscribeOutcome::ManualEntryRequired { advisory } => Some(advisory.clone()),
            _ => None,
        };
        self.enter(AnalysisPhase::Review);
        Ok(outcome)
    }

    /// Upload then transcribe.
    pub async fn process_recording(&mut self) -> Result<TranscribeOutcome, OrchestratorError> {
        self.upload().await?;
        self.transcribe().await
    }

    // -- review and analyze -------------------------------------------------

    /// Replace the transcript with examiner-typed text.
    ///
    /// Accepted without a recording too, so a denied microphone or a
    /// failing upload can always be worked around by typing. Not accepted
    /// while a capture is running.
    pub fn edit_transcript(&mut self, text: impl Into<String>) -> Result<(), OrchestratorError> {
        self.require(
            &[
                AnalysisPhase::Record,
                AnalysisPhase::Transcribe,
                AnalysisPhase::Review,
                AnalysisPhase::Results,
            ],
            "edit transcript",
        )?;
        if self.recorder.is_recording() {
            return Err(OrchestratorError::InvalidPhase {
                phase: "recording".to_string(),
                action: "edit transcript",
            });
        }
        self.transcript = Some(Transcript::new(text, TranscriptSource::Manual));
        self.live_partial = false;
        self.enter(AnalysisPhase::Review);
        Ok(())
    }

    /// Persist the current transcript without analyzing it.
    pub async fn save_transcript(&mut self) -> Result<(), OrchestratorError> {
        self.require(&[AnalysisPhase::Review, AnalysisPhase::Results], "save transcript")?;
        let text = match &self.transcript {
            Some(t) if !t.is_blank() => t.text.as_str(),
            _ => return Err(OrchestratorError::EmptyTranscript),
        };
        self.services
            .persistence
            .save_transcript(self.session_id, text)
            .await
            .map_err(|e| {
                warn!(session_id = self.session_id, error = %e, "saving transcript failed");
                OrchestratorError::TranscriptPersist(e)
            })?;
        info!(
            session_id = self.session_id,
            words = text.split_whitespace().count(),
            "transcript saved"
        );
        Ok(())
    }

    /// Whether [`analyze`](Self::analyze) would be accepted right now.
    pub fn can_analyze(&self) -> bool {
        matches!(self.phase, AnalysisPhase::Review | AnalysisPhase::Results)
            && self.transcript.as_ref().is_some_and(|t| !t.is_blank())
    }

    /// Persist the transcript, request analysis, and write the composite
    /// retell score into `sheet`.
    ///
    /// If the transcript cannot be saved, analysis is not attempted. An
    /// analysis without sub-scores leaves `sheet` untouched.
    pub async fn analyze(
        &mut self,
        sheet: &mut ScoreSheet,
    ) -> Result<NarrativeAnalysis, OrchestratorError> {
        self.require(&[AnalysisPhase::Review, AnalysisPhase::Results], "analyze")?;
        let text = match &self.transcript {
            Some(t) if !t.is_blank() => t.text.clone(),
            _ => return Err(OrchestratorError::EmptyTranscript),
        };

        self.enter(AnalysisPhase::Analyze);
        if let Err(e) = self
            .services
            .persistence
            .save_transcript(self.session_id, &text)
            .await
        {
            warn!(session_id = self.session_id, error = %e, "saving transcript failed");
            self.enter(AnalysisPhase::Review);
            return Err(OrchestratorError::TranscriptPersist(e));
        }

        let analysis = match self.services.analysis.analyze(self.session_id, &text).await {
            Ok(a) => a,
            Err(e) => {
                warn!(
                    service = self.services.analysis.name(),
                    error = %e,
                    "narrative analysis failed"
                );
                self.enter(AnalysisPhase::Review);
                return Err(OrchestratorError::Analysis(e));
            }
        };

        if analysis.is_empty() {
            info!(
                session_id = self.session_id,
                words = analysis.word_count,
                "narrative analysis returned no sub-scores; retell score left unchanged"
            );
        } else {
            sheet.record(
                ScoreEntry::new(RETELL_TARGET, analysis.total_retell_score)
                    .with_max(analysis.max_retell_score)
                    .with_notes(format!("automated analysis ({})", self.services.analysis.name())),
            );
            info!(
                session_id = self.session_id,
                total = analysis.total_retell_score,
                max = analysis.max_retell_score,
                "narrative analysis recorded"
            );
        }
        self.analysis = Some(analysis.clone());
        self.enter(AnalysisPhase::Results);
        Ok(analysis)
    }

    /// Tear down any capture and drop all artifacts.
    pub async fn cancel(&mut self) {
        self.rerecord().await;
    }
}
