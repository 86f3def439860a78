//! Whisper-compatible speech-to-text API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};

use readscore_core::error::ServiceError;
use readscore_core::model::AudioRecording;
use readscore_core::traits::{TranscriptionOutcome, TranscriptionService};

use crate::http::{build_client, check_status, read_json, send_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "whisper-1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const MISSING_KEY_ADVISORY: &str = "Automatic transcription is not configured. Set READSCORE_OPENAI_KEY to enable it, or type the transcript manually.";
const NO_SPEECH_ADVISORY: &str =
    "No speech was recognized in the recording. Please type the transcript manually.";

pub struct WhisperTranscriber {
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ServiceError> {
        Self::with_timeout(
            api_key,
            base_url,
            model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: timeout.as_secs(),
            client: build_client(timeout)?,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[async_trait]
impl TranscriptionService for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    #[instrument(skip(self, recording), fields(model = %self.model, bytes = recording.data.len()))]
    async fn transcribe(
        &self,
        session_id: u64,
        recording: &AudioRecording,
    ) -> Result<TranscriptionOutcome, ServiceError> {
        let Some(api_key) = &self.api_key else {
            debug!("no API key; manual transcription required");
            return Ok(TranscriptionOutcome::unavailable(MISSING_KEY_ADVISORY));
        };

        let part = Part::bytes(recording.data.clone())
            .file_name(recording.file_name())
            .mime_str(&recording.mime_type)
            .map_err(|e| ServiceError::Network(format!("invalid audio type: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;
        let body: WhisperResponse = read_json(check_status(response).await?).await?;

        let text = body.text.trim();
        if text.is_empty() {
            return Ok(TranscriptionOutcome::unavailable(NO_SPEECH_ADVISORY));
        }
        Ok(TranscriptionOutcome::transcribed(text))
    }
}
