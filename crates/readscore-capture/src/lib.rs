//! readscore-capture: Microphone capture and live transcription.
//!
//! [`AudioCaptureSession`] buffers microphone audio into a WAV recording
//! and, when asked, runs a [`LiveTranscriptionSession`] beside it. The two
//! run as separate tasks, so recognition failures never disturb the audio
//! buffer.

pub mod device;
pub mod live;
pub mod mock;
pub mod transcript;
pub mod wav;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use readscore_core::error::CaptureError;
use readscore_core::traits::{CapturedAudio, Recorder};

use crate::device::{MicStream, Microphone, SpeechRecognizer};
use crate::live::LiveTranscriptionSession;
use crate::wav::finalize_recording;

/// Capture tuning.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate requested from the microphone.
    pub sample_rate: u32,
    /// Recognition streams restarted per recording before live
    /// transcription gives up.
    pub max_recognition_restarts: u32,
    /// Pause before reopening an ended recognition stream.
    pub restart_backoff: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_recognition_restarts: 50,
            restart_backoff: Duration::from_millis(250),
        }
    }
}

/// One recording in progress.
struct ActiveCapture {
    started: Instant,
    recorded_at: DateTime<Utc>,
    sample_rate: u32,
    stop: watch::Sender<bool>,
    audio: JoinHandle<Vec<f32>>,
    live: Option<LiveTranscriptionSession>,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        self.audio.abort();
    }
}

/// Records one audio artifact at a time from a [`Microphone`].
pub struct AudioCaptureSession {
    microphone: Arc<dyn Microphone>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    config: CaptureConfig,
    active: Option<ActiveCapture>,
}

impl AudioCaptureSession {
    pub fn new(microphone: Arc<dyn Microphone>) -> Self {
        Self {
            microphone,
            recognizer: None,
            config: CaptureConfig::default(),
            active: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Whether the current recording has live transcription running.
    pub fn is_live(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.live.is_some())
    }

    async fn start_live(&self) -> Option<LiveTranscriptionSession> {
        let Some(recognizer) = self.recognizer.clone() else {
            info!("no speech recognizer; transcription will run after upload");
            return None;
        };
        match LiveTranscriptionSession::start(recognizer, &self.config).await {
            Ok(live) => Some(live),
            Err(CaptureError::RecognitionUnsupported) => {
                info!("speech recognition unsupported; transcription will run after upload");
                None
            }
            Err(e) => {
                warn!("live transcription unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Recorder for AudioCaptureSession {
    async fn start(&mut self, live_transcription: bool) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let stream = self.microphone.open(self.config.sample_rate).await?;
        let sample_rate = stream.sample_rate;
        let started = Instant::now();
        let recorded_at = Utc::now();
        info!(
            microphone = self.microphone.name(),
            sample_rate,
            live_transcription,
            "recording started"
        );

        let (stop, stop_rx) = watch::channel(false);
        let audio = tokio::spawn(buffer_audio(stream, stop_rx));
        let live = if live_transcription {
            self.start_live().await
        } else {
            None
        };

        self.active = Some(ActiveCapture {
            started,
            recorded_at,
            sample_rate,
            stop,
            audio,
            live,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<CapturedAudio, CaptureError> {
        let mut active = self.active.take().ok_or(CaptureError::NotRecording)?;
        let duration = active.started.elapsed();
        active.stop.send_replace(true);

        let (live_transcript, live_partial) = match active.live.take() {
            Some(live) => {
                let summary = live.finish().await;
                if summary.gave_up {
                    warn!(
                        restarts = summary.restarts,
                        "live transcription ended early; transcript is partial"
                    );
                }
                (Some(summary.transcript), summary.gave_up)
            }
            None => (None, false),
        };
        let samples = (&mut active.audio)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("audio task failed: {e}")))?;

        let recording =
            finalize_recording(&samples, active.sample_rate, duration, active.recorded_at)?;
        info!(
            duration_ms = duration.as_millis() as u64,
            samples = samples.len(),
            "recording stopped"
        );
        Ok(CapturedAudio {
            recording,
            live_transcript,
            live_partial,
        })
    }

    async fn cancel(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.stop.send_replace(true);
        if let Some(live) = active.live.take() {
            live.finish().await;
        }
        let _ = (&mut active.audio).await;
        info!("recording cancelled");
    }

    fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    fn live_preview(&self) -> String {
        self.active
            .as_ref()
            .and_then(|a| a.live.as_ref())
            .map(LiveTranscriptionSession::preview)
            .unwrap_or_default()
    }
}

/// Collect chunks until told to stop. The stream, and with it the device,
/// is dropped when this returns or is aborted.
async fn buffer_audio(stream: MicStream, mut stop: watch::Receiver<bool>) -> Vec<f32> {
    let MicStream {
        mut chunks, handle, ..
    } = stream;
    let mut samples = Vec::new();
    let mut device_open = true;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = stop.changed() => break,
            chunk = chunks.recv(), if device_open => chunk,
        };
        match chunk {
            Some(chunk) => samples.extend_from_slice(&chunk),
            None => {
                warn!(device = handle.name(), "microphone stopped delivering audio");
                device_open = false;
            }
        }
    }

    while let Ok(chunk) = chunks.try_recv() {
        samples.extend_from_slice(&chunk);
    }
    samples
}
