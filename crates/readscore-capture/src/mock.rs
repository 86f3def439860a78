//! Scripted devices for exercising capture without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use readscore_core::error::CaptureError;

use crate::device::{
    DeviceHandle, MicStream, Microphone, RecognitionEvent, RecognitionStream, SpeechRecognizer,
};

/// A microphone that delivers a fixed list of chunks.
///
/// By default the stream stays open after the chunks until the device is
/// released, like real hardware.
pub struct ScriptedMicrophone {
    chunks: Vec<Vec<f32>>,
    sample_rate: Option<u32>,
    denied: bool,
    ends: bool,
    opens: AtomicU32,
    releases: Arc<AtomicU32>,
}

impl ScriptedMicrophone {
    pub fn new(chunks: Vec<Vec<f32>>) -> Self {
        Self {
            chunks,
            sample_rate: None,
            denied: false,
            ends: false,
            opens: AtomicU32::new(0),
            releases: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// A microphone the platform refuses to open.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::silent()
        }
    }

    /// Report this rate instead of the requested one.
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Close the stream once the chunks are delivered.
    pub fn ending(mut self) -> Self {
        self.ends = true;
        self
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    fn name(&self) -> &str {
        "scripted-microphone"
    }

    async fn open(&self, sample_rate: u32) -> Result<MicStream, CaptureError> {
        if self.denied {
            return Err(CaptureError::PermissionDenied(
                "microphone permission was not granted".into(),
            ));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
        for chunk in &self.chunks {
            let _ = tx.try_send(chunk.clone());
        }

        let releases = self.releases.clone();
        let feed = if self.ends { None } else { Some(tx) };
        let handle = DeviceHandle::new(self.name(), move || {
            drop(feed);
            releases.fetch_add(1, Ordering::SeqCst);
        });

        Ok(MicStream {
            chunks: rx,
            sample_rate: self.sample_rate.unwrap_or(sample_rate),
            handle,
        })
    }
}

/// Events for one recognition stream.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    pub events: Vec<RecognitionEvent>,
    /// Close the stream after the events, as a provider timeout would.
    pub ends: bool,
}

/// A recognizer that plays queued sessions, then opens empty streams that
/// stay open (or end at once with [`ending_every_session`]).
///
/// [`ending_every_session`]: ScriptedRecognizer::ending_every_session
pub struct ScriptedRecognizer {
    supported: bool,
    sessions: Mutex<VecDeque<ScriptedSession>>,
    end_unscripted: bool,
    current: Mutex<Option<mpsc::WeakSender<RecognitionEvent>>>,
    starts: AtomicU32,
    releases: Arc<AtomicU32>,
}

impl Default for ScriptedRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self {
            supported: true,
            sessions: Mutex::new(VecDeque::new()),
            end_unscripted: false,
            current: Mutex::new(None),
            starts: AtomicU32::new(0),
            releases: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_session(self, session: ScriptedSession) -> Self {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(session);
        self
    }

    pub fn ending_every_session(mut self) -> Self {
        self.end_unscripted = true;
        self
    }

    /// Push an event into the stream currently open. Returns false when no
    /// stream is open.
    pub async fn emit(&self, event: RecognitionEvent) -> bool {
        let sender = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|weak| weak.upgrade());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted-recognizer"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn start(&self) -> Result<RecognitionStream, CaptureError> {
        if !self.supported {
            return Err(CaptureError::RecognitionUnsupported);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);

        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ScriptedSession {
                events: Vec::new(),
                ends: self.end_unscripted,
            });

        let (tx, rx) = mpsc::channel(session.events.len() + 16);
        for event in session.events {
            let _ = tx.try_send(event);
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx.downgrade());

        let releases = self.releases.clone();
        let feed = if session.ends { None } else { Some(tx) };
        let handle = DeviceHandle::new(self.name(), move || {
            drop(feed);
            releases.fetch_add(1, Ordering::SeqCst);
        });

        Ok(RecognitionStream { events: rx, handle })
    }
}
