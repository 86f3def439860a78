//! Client for the assessment backend's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use readscore_core::error::ServiceError;
use readscore_core::model::{
    AssessmentType, AudioRecording, DdmStimulus, Grade, NarrativeAnalysis, NewSession, Period,
    ScoreEntry, SessionRecord, Story,
};
use readscore_core::traits::{
    AnalysisService, PersistenceService, StimulusProvider, StoredScore, TranscriptionOutcome,
    TranscriptionService,
};

use crate::http::{build_client, check_status, read_json, send_error};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// One client for every backend-served collaborator: persistence,
/// stimulus, transcription and analysis.
pub struct BackendClient {
    base_url: String,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: Option<String>, api_token: Option<String>) -> Result<Self, ServiceError> {
        Self::with_timeout(
            base_url,
            api_token,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: Option<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs: timeout.as_secs(),
            client: build_client(timeout)?,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ServiceError> {
        let response = req
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;
        check_status(response).await
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ScoreUpdate<'a> {
    raw_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Serialize)]
struct TranscriptBody<'a> {
    transcript: &'a str,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    transcript: String,
}

#[derive(Deserialize)]
struct StoriesResponse {
    #[serde(default)]
    stories: Vec<Story>,
}

#[derive(Deserialize)]
struct StimulusResponse {
    data: DdmStimulus,
}

/// Interpret the backend's transcription text. Placeholders and errors
/// come back bracketed, e.g. `[Transcription error: ...]`.
fn transcription_outcome(text: String) -> TranscriptionOutcome {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        TranscriptionOutcome::unavailable(trimmed)
    } else if trimmed.is_empty() {
        TranscriptionOutcome::unavailable("The recording produced no transcript.")
    } else {
        TranscriptionOutcome::transcribed(trimmed)
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl PersistenceService for BackendClient {
    #[instrument(skip(self, session), fields(student_id = session.student_id, subtest = ?session.subtest))]
    async fn start_session(&self, session: &NewSession) -> Result<SessionRecord, ServiceError> {
        let req = self.request(Method::POST, "/assessments/start").json(session);
        let record: SessionRecord = read_json(self.send(req).await?).await?;
        debug!(session_id = record.id, "session started");
        Ok(record)
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn add_scores(
        &self,
        session_id: u64,
        entries: &[ScoreEntry],
    ) -> Result<Vec<StoredScore>, ServiceError> {
        let req = self
            .request(
                Method::POST,
                &format!("/assessments/{session_id}/manual-scores"),
            )
            .json(entries);
        read_json(self.send(req).await?).await
    }

    #[instrument(skip(self, entry))]
    async fn edit_score(
        &self,
        session_id: u64,
        score_id: u64,
        entry: &ScoreEntry,
    ) -> Result<StoredScore, ServiceError> {
        let body = ScoreUpdate {
            raw_score: entry.raw_score,
            notes: entry.notes.as_deref(),
        };
        let req = self
            .request(
                Method::PUT,
                &format!("/assessments/{session_id}/scores/{score_id}"),
            )
            .json(&body);
        read_json(self.send(req).await?).await
    }

    #[instrument(skip(self))]
    async fn complete_session(&self, session_id: u64) -> Result<(), ServiceError> {
        let req = self.request(Method::POST, &format!("/assessments/{session_id}/complete"));
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self, recording), fields(bytes = recording.data.len()))]
    async fn upload_audio(
        &self,
        session_id: u64,
        recording: &AudioRecording,
    ) -> Result<(), ServiceError> {
        let part = Part::bytes(recording.data.clone())
            .file_name(recording.file_name())
            .mime_str(&recording.mime_type)
            .map_err(|e| ServiceError::Network(format!("invalid audio type: {e}")))?;
        let form = Form::new().part("file", part);
        let req = self
            .request(
                Method::POST,
                &format!("/assessments/{session_id}/upload-audio"),
            )
            .multipart(form);
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self, transcript), fields(chars = transcript.len()))]
    async fn save_transcript(&self, session_id: u64, transcript: &str) -> Result<(), ServiceError> {
        let req = self
            .request(
                Method::POST,
                &format!("/assessments/{session_id}/set-transcript"),
            )
            .json(&TranscriptBody { transcript });
        self.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptionService for BackendClient {
    fn name(&self) -> &str {
        "backend"
    }

    /// Transcribes the audio last uploaded for the session.
    #[instrument(skip(self, _recording))]
    async fn transcribe(
        &self,
        session_id: u64,
        _recording: &AudioRecording,
    ) -> Result<TranscriptionOutcome, ServiceError> {
        let req = self.request(
            Method::POST,
            &format!("/assessments/{session_id}/transcribe"),
        );
        let body: TranscriptResponse = read_json(self.send(req).await?).await?;
        Ok(transcription_outcome(body.transcript))
    }
}

#[async_trait]
impl AnalysisService for BackendClient {
    fn name(&self) -> &str {
        "backend"
    }

    /// Analyzes the transcript stored for the session, which the caller
    /// saves first.
    #[instrument(skip(self, transcript), fields(chars = transcript.len()))]
    async fn analyze(
        &self,
        session_id: u64,
        transcript: &str,
    ) -> Result<NarrativeAnalysis, ServiceError> {
        let req = self.request(
            Method::POST,
            &format!("/assessments/{session_id}/analyze-transcript"),
        );
        read_json(self.send(req).await?).await
    }
}

#[async_trait]
impl StimulusProvider for BackendClient {
    #[instrument(skip(self))]
    async fn stories(
        &self,
        grade: Grade,
        period: Period,
        assessment_type: AssessmentType,
    ) -> Result<Vec<Story>, ServiceError> {
        let req = self.request(
            Method::GET,
            &format!("/stimulus/stories/{grade}/{period}?assessment_type={assessment_type}"),
        );
        let body: StoriesResponse = read_json(self.send(req).await?).await?;
        Ok(body.stories)
    }

    #[instrument(skip(self))]
    async fn ddm_stimulus(&self, target: &str) -> Result<DdmStimulus, ServiceError> {
        let req = self.request(Method::GET, &format!("/stimulus/ddm-grid/{target}"));
        let body: StimulusResponse = read_json(self.send(req).await?).await?;
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readscore_core::model::SubtestId;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(Some(format!("{}/api", server.uri())), Some("tok".into())).unwrap()
    }

    fn recording() -> AudioRecording {
        AudioRecording {
            id: uuid::Uuid::new_v4(),
            data: b"RIFFdata".to_vec(),
            mime_type: "audio/wav".into(),
            duration: Duration::from_secs(3),
            recorded_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn start_session_sends_backend_field_names() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/start"))
            .and(header("Authorization", "Bearer tok"))
            .and(body_json(serde_json::json!({
                "student_id": 7,
                "subtest": "NLM_READING",
                "grade_at_test": "3",
                "academic_year": "2025-2026",
                "time_of_year": "BOY",
                "assessment_type": "benchmark"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "student_id": 7,
                "examiner_id": 1,
                "subtest": "NLM_READING",
                "is_complete": false
            })))
            .mount(&server)
            .await;

        let record = client(&server)
            .start_session(&NewSession {
                student_id: 7,
                subtest: SubtestId::NlmReading,
                grade: Grade::Numbered(3),
                academic_year: "2025-2026".into(),
                period: Period::Boy,
                assessment_type: AssessmentType::Benchmark,
            })
            .await
            .unwrap();
        assert_eq!(record.id, 42);
        assert!(!record.is_complete);
    }

    #[tokio::test]
    async fn add_scores_posts_entries_as_computed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/42/manual-scores"))
            .and(body_json(serde_json::json!([
                {"target": "NLM_RETELL", "raw_score": 18.0},
                {"target": "NLM_RETELL", "sub_target": "NDC", "raw_score": 9.0}
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "target": "NLM_RETELL", "sub_target": null, "raw_score": 18.0, "max_score": null, "risk_level": null},
                {"id": 2, "target": "NLM_RETELL", "sub_target": "NDC", "raw_score": 9.0, "max_score": null, "risk_level": null}
            ])))
            .mount(&server)
            .await;

        let stored = client(&server)
            .add_scores(
                42,
                &[
                    ScoreEntry::new("NLM_RETELL", 18),
                    ScoreEntry::new("NLM_RETELL", 9).with_sub_target("NDC"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].id, 2);
        assert_eq!(stored[1].entry.sub_target.as_deref(), Some("NDC"));
    }

    #[tokio::test]
    async fn status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/api/assessments/1/complete"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"detail": "Could not validate credentials"}),
            ))
            .mount(&server)
            .await;
        Mock::given(path("/api/assessments/2/complete"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"detail": "Test session not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/api/assessments/3/complete"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.complete_session(1).await.unwrap_err(),
            ServiceError::Unauthorized("Could not validate credentials".into())
        );
        let not_found = client.complete_session(2).await.unwrap_err();
        assert_eq!(
            not_found,
            ServiceError::NotFound("Test session not found".into())
        );
        assert!(not_found.is_permanent());
        assert_eq!(
            client.complete_session(3).await.unwrap_err(),
            ServiceError::Api {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn upload_is_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/5/upload-audio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"message": "Audio uploaded successfully"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).upload_audio(5, &recording()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("audio/wav"));
    }

    #[tokio::test]
    async fn bracketed_transcript_is_not_auto() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/9/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transcript": "[IntelliScore placeholder] Audio recorded successfully."
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/10/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transcript": "The boy lost his dog."
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let placeholder = client.transcribe(9, &recording()).await.unwrap();
        assert!(!placeholder.auto_transcribed);
        assert!(placeholder.transcript.is_none());
        assert!(placeholder.message.unwrap().starts_with("[IntelliScore"));

        let real = client.transcribe(10, &recording()).await.unwrap();
        assert!(real.auto_transcribed);
        assert_eq!(real.transcript.as_deref(), Some("The boy lost his dog."));
    }

    #[tokio::test]
    async fn analysis_ignores_extra_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/4/analyze-transcript"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "word_count": 12,
                "sentence_count": 2,
                "unique_words": 10,
                "type_token_ratio": 0.833,
                "sub_scores": {
                    "EC": {"score": 3, "max": 3, "label": "Episode Complexity", "detail": "Problem: yes"}
                },
                "total_retell_score": 3,
                "max_retell_score": 12
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/5/analyze-transcript"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = client(&server);
        let analysis = client.analyze(4, "text").await.unwrap();
        assert_eq!(analysis.word_count, 12);
        assert_eq!(analysis.sub_scores["EC"].score, 3);
        assert_eq!(analysis.max_retell_score, 12);
        assert!(client.analyze(5, "[placeholder]").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_transcript_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/assessments/4/set-transcript"))
            .and(body_json(serde_json::json!({"transcript": "hello"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"transcript": "hello"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        client(&server).save_transcript(4, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn stimulus_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stimulus/stories/2/MOY"))
            .and(query_param("assessment_type", "progress_monitoring"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stories": [{"title": "The Lost Kite", "text": "Maya had a kite."}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stimulus/ddm-grid/LETTER_NAMES"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [["a", "b"], ["c", "d"]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stimulus/ddm-grid/WORDS_IN_CONTEXT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": "The stodrun ran."
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let stories = client
            .stories(
                Grade::Numbered(2),
                Period::Moy,
                AssessmentType::ProgressMonitoring,
            )
            .await
            .unwrap();
        assert_eq!(stories[0].title, "The Lost Kite");

        assert!(matches!(
            client.ddm_stimulus("LETTER_NAMES").await.unwrap(),
            DdmStimulus::Grid(rows) if rows.len() == 2
        ));
        assert!(matches!(
            client.ddm_stimulus("WORDS_IN_CONTEXT").await.unwrap(),
            DdmStimulus::Passage(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let client = BackendClient::new(Some("http://127.0.0.1:9".into()), None).unwrap();
        let err = client.complete_session(1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Network(_) | ServiceError::Timeout(_)));
    }
}
