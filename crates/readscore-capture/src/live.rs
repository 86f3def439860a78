//! Live transcription supervisor.
//!
//! A worker task drains one recognition stream and forwards fragments to
//! the supervisor. The supervisor owns the transcript and is the only
//! place that decides whether an ended stream is restarted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use readscore_core::error::CaptureError;

use crate::device::{RecognitionEvent, RecognitionStream, SpeechRecognizer};
use crate::transcript::LiveTranscript;
use crate::CaptureConfig;

const UPDATE_BUFFER: usize = 64;

/// Message from a stream worker to the supervisor.
#[derive(Debug)]
enum WorkerUpdate {
    Final(String),
    Interim(String),
    /// The stream closed or errored. Its device is already released.
    Ended { error: Option<String> },
}

/// Aborts the task when dropped, so a torn-down supervisor never leaves
/// its worker (and the recognizer it holds) running.
struct WorkerGuard(Option<JoinHandle<()>>);

impl WorkerGuard {
    fn spawn(stream: RecognitionStream, updates: mpsc::Sender<WorkerUpdate>) -> Self {
        Self(Some(tokio::spawn(drain_stream(stream, updates))))
    }

    /// Abort and wait until the worker has dropped its stream.
    async fn shutdown(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// What a live session produced once stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSummary {
    /// Finals only.
    pub transcript: String,
    pub restarts: u32,
    /// Recognition ended for good while audio was still recording, so
    /// the transcript covers only part of the retell.
    pub gave_up: bool,
}

/// A running live transcription alongside an audio capture.
pub struct LiveTranscriptionSession {
    stop: watch::Sender<bool>,
    preview: watch::Receiver<String>,
    supervisor: Option<JoinHandle<LiveSummary>>,
}

impl LiveTranscriptionSession {
    /// Start recognition. Unsupported platforms fail up front with
    /// [`CaptureError::RecognitionUnsupported`].
    pub async fn start(
        recognizer: Arc<dyn SpeechRecognizer>,
        config: &CaptureConfig,
    ) -> Result<Self, CaptureError> {
        if !recognizer.is_supported() {
            return Err(CaptureError::RecognitionUnsupported);
        }
        let stream = recognizer.start().await?;
        info!(recognizer = recognizer.name(), "live transcription started");

        let (stop, stop_rx) = watch::channel(false);
        let (preview_tx, preview) = watch::channel(String::new());
        let supervisor = tokio::spawn(supervise(
            recognizer,
            stream,
            stop_rx,
            preview_tx,
            config.max_recognition_restarts,
            config.restart_backoff,
        ));

        Ok(Self {
            stop,
            preview,
            supervisor: Some(supervisor),
        })
    }

    /// Finals plus the current interim.
    pub fn preview(&self) -> String {
        self.preview.borrow().clone()
    }

    /// Stop recognition, release the recognizer, and return the finals.
    pub async fn finish(mut self) -> LiveSummary {
        self.stop.send_replace(true);
        let Some(handle) = self.supervisor.take() else {
            return LiveSummary::default();
        };
        match handle.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("live transcription supervisor failed: {}", e);
                LiveSummary::default()
            }
        }
    }
}

impl Drop for LiveTranscriptionSession {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn drain_stream(stream: RecognitionStream, updates: mpsc::Sender<WorkerUpdate>) {
    let RecognitionStream { mut events, handle } = stream;
    let mut error = None;

    while let Some(event) = events.recv().await {
        let update = match event {
            RecognitionEvent::Final(text) => WorkerUpdate::Final(text),
            RecognitionEvent::Interim(text) => WorkerUpdate::Interim(text),
            RecognitionEvent::Error(e) => {
                error = Some(e);
                break;
            }
        };
        if updates.send(update).await.is_err() {
            return;
        }
    }

    drop(events);
    drop(handle);
    let _ = updates.send(WorkerUpdate::Ended { error }).await;
}

async fn supervise(
    recognizer: Arc<dyn SpeechRecognizer>,
    stream: RecognitionStream,
    mut stop: watch::Receiver<bool>,
    preview: watch::Sender<String>,
    max_restarts: u32,
    backoff: Duration,
) -> LiveSummary {
    let (tx, mut updates) = mpsc::channel(UPDATE_BUFFER);
    let mut worker = Some(WorkerGuard::spawn(stream, tx.clone()));
    let mut transcript = LiveTranscript::new();
    let mut restarts = 0u32;
    let mut gave_up = false;

    loop {
        let update = tokio::select! {
            biased;
            _ = stop.changed() => None,
            update = updates.recv() => update,
        };
        let Some(update) = update else { break };

        match update {
            WorkerUpdate::Final(text) => {
                transcript.push_final(&text);
                preview.send_replace(transcript.preview());
            }
            WorkerUpdate::Interim(text) => {
                transcript.set_interim(&text);
                preview.send_replace(transcript.preview());
            }
            WorkerUpdate::Ended { error } => {
                worker = None;
                if let Some(e) = error {
                    warn!("recognition error, treating as end of stream: {}", e);
                }
                transcript.set_interim("");
                preview.send_replace(transcript.preview());

                match restart(&*recognizer, &mut stop, restarts, max_restarts, backoff).await {
                    Some(stream) => {
                        restarts += 1;
                        info!(restarts, "recognition stream restarted");
                        worker = Some(WorkerGuard::spawn(stream, tx.clone()));
                    }
                    None => {
                        gave_up = !*stop.borrow();
                        break;
                    }
                }
            }
        }
    }

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    // Finals the worker forwarded before it was stopped still count.
    while let Ok(update) = updates.try_recv() {
        if let WorkerUpdate::Final(text) = update {
            transcript.push_final(&text);
        }
    }

    debug!(restarts, gave_up, "live transcription finished");
    LiveSummary {
        transcript: transcript.finish(),
        restarts,
        gave_up,
    }
}

/// Open a replacement stream, unless recording has stopped or the restart
/// budget is spent.
async fn restart(
    recognizer: &dyn SpeechRecognizer,
    stop: &mut watch::Receiver<bool>,
    attempts: u32,
    max_restarts: u32,
    backoff: Duration,
) -> Option<RecognitionStream> {
    if *stop.borrow() {
        return None;
    }
    if attempts >= max_restarts {
        warn!(max_restarts, "recognition restart limit reached; live transcription stopped");
        return None;
    }

    let stopped = tokio::select! {
        biased;
        _ = stop.changed() => true,
        _ = tokio::time::sleep(backoff) => false,
    };
    if stopped {
        return None;
    }

    match recognizer.start().await {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("failed to restart recognition: {}", e);
            None
        }
    }
}
