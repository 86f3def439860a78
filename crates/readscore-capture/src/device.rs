//! Device seams: the microphone and the platform speech recognizer.
//!
//! Both hand out a channel plus a [`DeviceHandle`]. The handle releases
//! the underlying device when dropped, so whichever task owns it releases
//! the device on every exit path, including abort.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use readscore_core::error::CaptureError;

/// Release guard for an acquired device.
pub struct DeviceHandle {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        debug!(device = %self.name, "device released");
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// An open microphone: mono `f32` chunks at `sample_rate`.
///
/// The chunk channel closing means the device stopped delivering audio.
pub struct MicStream {
    pub chunks: mpsc::Receiver<Vec<f32>>,
    pub sample_rate: u32,
    pub handle: DeviceHandle,
}

/// One update from a running recognition stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Settled text; appended to the transcript.
    Final(String),
    /// Provisional text for the utterance in progress; replaces the
    /// previous interim.
    Interim(String),
    /// The engine reported an error. The stream is treated as ended.
    Error(String),
}

/// A running recognition stream. The event channel closing means the
/// engine ended the stream (typically a provider segment timeout).
pub struct RecognitionStream {
    pub events: mpsc::Receiver<RecognitionEvent>,
    pub handle: DeviceHandle,
}

#[async_trait]
pub trait Microphone: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire the device at (ideally) `sample_rate`; the stream reports
    /// the rate actually delivered. Fails with
    /// [`CaptureError::PermissionDenied`] when the platform refuses access.
    async fn open(&self, sample_rate: u32) -> Result<MicStream, CaptureError>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the platform offers continuous recognition at all.
    fn is_supported(&self) -> bool;

    async fn start(&self) -> Result<RecognitionStream, CaptureError>;
}
