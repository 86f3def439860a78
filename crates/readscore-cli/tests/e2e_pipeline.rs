//! End-to-end narrative analysis tests: scripted capture devices feeding
//! the orchestrator, with in-memory services standing in for the backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use readscore_capture::device::RecognitionEvent;
use readscore_capture::mock::{ScriptedMicrophone, ScriptedRecognizer, ScriptedSession};
use readscore_capture::{AudioCaptureSession, CaptureConfig};
use readscore_core::error::{CaptureError, OrchestratorError, ServiceError};
use readscore_core::model::{Grade, NewSession, Period, ScoreEntry, SubtestId, TranscriptSource};
use readscore_core::orchestrator::{
    AnalysisPhase, AnalysisServices, NarrativeAnalysisOrchestrator, TranscribeOutcome,
};
use readscore_core::parser::{parse_sheet, SheetDocument};
use readscore_core::retell::{score_retell, RETELL_TARGET};
use readscore_core::sheet::ScoreSheet;
use readscore_core::traits::{PersistenceService, TranscriptionOutcome};
use readscore_providers::mock::Operation;
use readscore_providers::{HeuristicAnalyzer, MockServices};

fn tone(chunks: usize) -> Vec<Vec<f32>> {
    (0..chunks).map(|_| vec![0.1; 1600]).collect()
}

fn mock_services(mock: &Arc<MockServices>) -> AnalysisServices {
    AnalysisServices {
        persistence: mock.clone(),
        transcription: Some(mock.clone()),
        analysis: mock.clone(),
    }
}

async fn open_session(mock: &MockServices) -> u64 {
    mock.start_session(&NewSession {
        student_id: 42,
        subtest: SubtestId::NlmListening,
        grade: Grade::Numbered(2),
        academic_year: "2025-2026".into(),
        period: Period::Boy,
        assessment_type: Default::default(),
    })
    .await
    .unwrap()
    .id
}

// --- Live transcription path ---

#[tokio::test(start_paused = true)]
async fn e2e_live_transcript_is_analyzed_and_submitted() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;

    let mic = Arc::new(ScriptedMicrophone::new(tone(4)));
    let recognizer = Arc::new(ScriptedRecognizer::new().with_session(ScriptedSession {
        events: vec![
            RecognitionEvent::Final("the girl lost her kite".into()),
            RecognitionEvent::Interim("and then".into()),
            RecognitionEvent::Final("then she found it in a tree".into()),
        ],
        ends: false,
    }));
    let capture = AudioCaptureSession::new(mic.clone()).with_recognizer(recognizer.clone());
    let mut orchestrator =
        NarrativeAnalysisOrchestrator::new(session_id, Box::new(capture), mock_services(&mock));

    orchestrator.start_recording(true).await.unwrap();
    assert!(orchestrator.is_recording());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(orchestrator.live_preview().starts_with("the girl lost her kite"));

    let duration = orchestrator.stop_recording().await.unwrap();
    assert_eq!(duration, Duration::from_secs(3));
    assert_eq!(mic.releases(), 1);
    assert_eq!(recognizer.releases(), 1);

    let outcome = orchestrator.process_recording().await.unwrap();
    assert_eq!(outcome, TranscribeOutcome::LiveTranscriptKept);
    assert_eq!(mock.uploads(session_id), 1);
    assert_eq!(mock.calls(Operation::Transcribe), 0);
    assert_eq!(
        orchestrator.transcript().unwrap().text,
        "the girl lost her kite then she found it in a tree"
    );

    let mut sheet = ScoreSheet::new();
    sheet.record(ScoreEntry::new("NLM_QUESTIONS", 18).with_max(32));
    let analysis = orchestrator.analyze(&mut sheet).await.unwrap();
    assert_eq!(analysis.total_retell_score, 7);
    assert_eq!(orchestrator.phase(), AnalysisPhase::Results);
    assert_eq!(
        mock.saved_transcript(session_id).as_deref(),
        Some("the girl lost her kite then she found it in a tree")
    );

    sheet.submit(mock.as_ref(), session_id).await.unwrap();
    let stored = mock.scores(session_id);
    assert_eq!(stored.len(), 2);
    let retell = stored.iter().find(|e| e.target == RETELL_TARGET).unwrap();
    assert_eq!(retell.raw_score, 7.0);
    assert_eq!(retell.max_score, Some(12.0));
    assert!(mock.is_complete(session_id));
}

// --- Post-hoc transcription path ---

#[tokio::test(start_paused = true)]
async fn e2e_post_hoc_transcription_with_heuristic_analysis() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;
    let services = AnalysisServices {
        analysis: Arc::new(HeuristicAnalyzer::new().unwrap()),
        ..mock_services(&mock)
    };

    let mic = Arc::new(ScriptedMicrophone::new(tone(2)));
    let mut orchestrator =
        NarrativeAnalysisOrchestrator::new(session_id, Box::new(AudioCaptureSession::new(mic)), services);

    orchestrator.start_recording(false).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    orchestrator.stop_recording().await.unwrap();
    assert!(orchestrator.transcript().is_none());

    let outcome = orchestrator.process_recording().await.unwrap();
    assert_eq!(outcome, TranscribeOutcome::Transcribed);
    assert_eq!(mock.calls(Operation::Transcribe), 1);

    let mut sheet = ScoreSheet::new();
    let analysis = orchestrator.analyze(&mut sheet).await.unwrap();
    // lost / looked / found: a complete episode with no subordination.
    assert_eq!(analysis.sub_scores["EC"].score, 3);
    assert_eq!(analysis.sub_scores["SC"].score, 0);
    assert_eq!(analysis.total_retell_score, 7);

    let entry = sheet.get(RETELL_TARGET, None).unwrap();
    assert_eq!(entry.raw_score, 7.0);
    assert!(entry.notes.as_deref().unwrap().contains("heuristic"));
    assert_eq!(mock.calls(Operation::Analyze), 0);
}

#[tokio::test(start_paused = true)]
async fn e2e_unavailable_transcription_needs_manual_entry() {
    let mock = Arc::new(MockServices::new().with_transcription(
        TranscriptionOutcome::unavailable("Transcription is not configured."),
    ));
    let session_id = open_session(&mock).await;

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::silent()))),
        mock_services(&mock),
    );

    orchestrator.start_recording(false).await.unwrap();
    orchestrator.stop_recording().await.unwrap();
    let outcome = orchestrator.process_recording().await.unwrap();
    assert_eq!(
        outcome,
        TranscribeOutcome::ManualEntryRequired {
            advisory: "Transcription is not configured.".into()
        }
    );
    assert_eq!(orchestrator.advisory(), Some("Transcription is not configured."));
    assert!(!orchestrator.can_analyze());

    let mut sheet = ScoreSheet::new();
    let err = orchestrator.analyze(&mut sheet).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::EmptyTranscript));

    orchestrator
        .edit_transcript("The cat climbed a tree because it was scared.")
        .unwrap();
    assert!(orchestrator.can_analyze());
    orchestrator.analyze(&mut sheet).await.unwrap();
    assert_eq!(
        mock.saved_transcript(session_id).as_deref(),
        Some("The cat climbed a tree because it was scared.")
    );
    assert!(sheet.get(RETELL_TARGET, None).is_some());
}

// --- Failure paths ---

#[tokio::test(start_paused = true)]
async fn e2e_upload_failure_keeps_recording_for_retry() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;
    mock.fail(
        Operation::UploadAudio,
        ServiceError::Network("connection reset".into()),
    );

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::new(tone(1))))),
        mock_services(&mock),
    );
    orchestrator.start_recording(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    orchestrator.stop_recording().await.unwrap();

    let err = orchestrator.process_recording().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Upload(ServiceError::Network(_))));
    assert_eq!(orchestrator.phase(), AnalysisPhase::Record);
    assert!(orchestrator.recording().is_some());
    assert_eq!(mock.calls(Operation::Transcribe), 0);

    mock.recover(Operation::UploadAudio);
    orchestrator.process_recording().await.unwrap();
    assert_eq!(mock.uploads(session_id), 1);
    assert_eq!(orchestrator.phase(), AnalysisPhase::Review);
}

#[tokio::test(start_paused = true)]
async fn e2e_transcript_save_failure_skips_analysis() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;
    mock.fail(
        Operation::SaveTranscript,
        ServiceError::Api {
            status: 500,
            message: "database unavailable".into(),
        },
    );

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::new(tone(1))))),
        mock_services(&mock),
    );
    orchestrator.start_recording(false).await.unwrap();
    orchestrator.stop_recording().await.unwrap();
    orchestrator.process_recording().await.unwrap();

    let mut sheet = ScoreSheet::new();
    let err = orchestrator.analyze(&mut sheet).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TranscriptPersist(_)));
    assert_eq!(mock.calls(Operation::Analyze), 0);
    assert!(sheet.is_empty());
    assert!(orchestrator.can_analyze());
}

#[tokio::test]
async fn e2e_permission_denied_never_uploads() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::denied()))),
        mock_services(&mock),
    );
    let err = orchestrator.start_recording(true).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Capture(CaptureError::PermissionDenied(_))
    ));
    assert!(!orchestrator.is_recording());

    let err = orchestrator.process_recording().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoRecording));
    assert_eq!(mock.uploads(session_id), 0);
}

#[tokio::test]
async fn e2e_denied_microphone_falls_back_to_typed_transcript() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::denied()))),
        mock_services(&mock),
    );
    assert!(orchestrator.start_recording(true).await.is_err());
    assert!(!orchestrator.can_analyze());

    orchestrator
        .edit_transcript("The girl lost her kite. She climbed the tree and got it back.")
        .unwrap();
    assert_eq!(orchestrator.phase(), AnalysisPhase::Review);
    assert!(orchestrator.can_analyze());

    orchestrator.save_transcript().await.unwrap();
    assert_eq!(mock.calls(Operation::SaveTranscript), 1);
    assert_eq!(mock.calls(Operation::Analyze), 0);

    let mut sheet = ScoreSheet::new();
    let analysis = orchestrator.analyze(&mut sheet).await.unwrap();
    assert_eq!(orchestrator.phase(), AnalysisPhase::Results);
    assert_eq!(
        sheet.get(RETELL_TARGET, None).unwrap().raw_score,
        f64::from(analysis.total_retell_score)
    );
    assert_eq!(mock.uploads(session_id), 0);
    assert_eq!(
        mock.saved_transcript(session_id).as_deref(),
        Some("The girl lost her kite. She climbed the tree and got it back.")
    );
}

#[tokio::test]
async fn e2e_placeholder_transcript_keeps_examiner_retell_score() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;
    let services = AnalysisServices {
        analysis: Arc::new(HeuristicAnalyzer::new().unwrap()),
        ..mock_services(&mock)
    };
    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(Arc::new(ScriptedMicrophone::silent()))),
        services,
    );

    let mut sheet = ScoreSheet::new();
    sheet.record(ScoreEntry::new(RETELL_TARGET, 31).with_max(40));

    orchestrator
        .edit_transcript("[inaudible] the fox was lost")
        .unwrap();
    let analysis = orchestrator.analyze(&mut sheet).await.unwrap();
    assert!(analysis.is_empty());

    let entry = sheet.get(RETELL_TARGET, None).unwrap();
    assert_eq!(entry.raw_score, 31.0);
    assert_eq!(entry.max_score, Some(40.0));
    assert_eq!(sheet.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_partial_live_transcript_falls_back_to_service() {
    let mock = Arc::new(
        MockServices::new().with_transcription(TranscriptionOutcome::transcribed(
            "the girl lost her kite and then she found it in a tree",
        )),
    );
    let session_id = open_session(&mock).await;

    let recognizer = Arc::new(ScriptedRecognizer::new().with_session(ScriptedSession {
        events: vec![RecognitionEvent::Final("the girl lost her kite".into())],
        ends: true,
    }));
    let capture = AudioCaptureSession::new(Arc::new(ScriptedMicrophone::new(tone(2))))
        .with_recognizer(recognizer.clone())
        .with_config(CaptureConfig {
            max_recognition_restarts: 0,
            ..CaptureConfig::default()
        });
    let mut orchestrator =
        NarrativeAnalysisOrchestrator::new(session_id, Box::new(capture), mock_services(&mock));

    orchestrator.start_recording(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    orchestrator.stop_recording().await.unwrap();
    assert_eq!(recognizer.starts(), 1);
    assert_eq!(
        orchestrator.transcript().unwrap().text,
        "the girl lost her kite"
    );

    let outcome = orchestrator.process_recording().await.unwrap();
    assert_eq!(outcome, TranscribeOutcome::Transcribed);
    assert_eq!(mock.calls(Operation::Transcribe), 1);
    let transcript = orchestrator.transcript().unwrap();
    assert_eq!(transcript.source, TranscriptSource::Service);
    assert_eq!(
        transcript.text,
        "the girl lost her kite and then she found it in a tree"
    );
}

// --- Persistence round-trip ---

#[tokio::test]
async fn e2e_retell_sheet_round_trips_through_persistence() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;

    let doc = parse_sheet(Path::new("../../fixtures/retell-grade3.toml")).unwrap();
    let SheetDocument::Retell(retell) = doc else {
        panic!("fixture is not a retell sheet");
    };
    let score = score_retell(&retell.judgments, retell.grade);

    let mut sheet = ScoreSheet::new();
    sheet.record_all(score.score_entries());
    let returned = sheet.submit(mock.as_ref(), session_id).await.unwrap();
    assert_eq!(returned.len(), sheet.len());
    assert!(mock.is_complete(session_id));

    let stored = mock.scores(session_id);
    let raw = |sub: Option<&str>| {
        stored
            .iter()
            .find(|e| e.target == RETELL_TARGET && e.sub_target.as_deref() == sub)
            .unwrap_or_else(|| panic!("no stored score for {sub:?}"))
            .raw_score
    };
    assert_eq!(raw(None), f64::from(score.total));
    assert_eq!(raw(Some("NDC")), f64::from(score.ndc));
    assert_eq!(raw(Some("SC")), f64::from(score.sc));
    assert_eq!(raw(Some("EDC")), f64::from(score.edc));
    assert_eq!(raw(Some("VC")), f64::from(score.vc));
    assert_eq!(raw(Some("EC1")), f64::from(score.ec1));
    assert_eq!(raw(Some("EC2")), f64::from(score.ec2));
    assert_eq!(
        score.total,
        score.ndc + score.sc + score.edc + score.vc + score.ec1 + score.ec2
    );
    assert_eq!(score.total, 28);
}

#[tokio::test(start_paused = true)]
async fn e2e_rerecord_discards_previous_take() {
    let mock = Arc::new(MockServices::new());
    let session_id = open_session(&mock).await;
    let mic = Arc::new(ScriptedMicrophone::new(tone(1)));

    let mut orchestrator = NarrativeAnalysisOrchestrator::new(
        session_id,
        Box::new(AudioCaptureSession::new(mic.clone())),
        mock_services(&mock),
    );
    orchestrator.start_recording(false).await.unwrap();
    orchestrator.stop_recording().await.unwrap();
    orchestrator.process_recording().await.unwrap();
    assert!(orchestrator.transcript().is_some());

    orchestrator.rerecord().await;
    assert_eq!(orchestrator.phase(), AnalysisPhase::Record);
    assert!(orchestrator.recording().is_none());
    assert!(orchestrator.transcript().is_none());

    orchestrator.start_recording(false).await.unwrap();
    orchestrator.stop_recording().await.unwrap();
    assert_eq!(mic.opens(), 2);
    assert_eq!(mic.releases(), 2);
}
