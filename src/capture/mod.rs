//! Speech capture collaborators.
//!
//! A capture produces at most one final transcript per activation and then
//! signals the end of capture, or reports an error. Recognition itself is the
//! collaborator's business; the controller only sees [`CaptureEvent`]s.

mod command;

pub use command::CommandCapture;

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::pipeline::messages::CaptureEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Begins one capture per call.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Start capturing and return the events of this activation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AssistantError::CaptureUnavailable`] when no
    /// capture engine exists on this system.
    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>>;
}

/// Build the capture described by the configuration: typed input, falling
/// back to the external command (when one is configured) for activations
/// with nothing typed.
pub fn from_config(config: &CaptureConfig) -> Arc<TextCapture> {
    let capture = TextCapture::new();
    Arc::new(match &config.command {
        Some(_) => capture.with_fallback(Arc::new(CommandCapture::new(config.clone()))),
        None => capture,
    })
}

/// Capture backed by text supplied ahead of time (typed input, scripted runs).
///
/// Each activation consumes the transcript set by [`TextCapture::provide`].
/// With nothing provided, the activation is handed to the fallback capture,
/// or ends without a transcript when there is none.
#[derive(Default)]
pub struct TextCapture {
    next: Mutex<Option<String>>,
    fallback: Option<Arc<dyn SpeechCapture>>,
}

impl std::fmt::Debug for TextCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextCapture")
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl TextCapture {
    /// Create a capture with no transcript queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capture whose first activation yields `transcript`.
    pub fn with_transcript(transcript: impl Into<String>) -> Self {
        Self {
            next: Mutex::new(Some(transcript.into())),
            fallback: None,
        }
    }

    /// Use `fallback` for activations with no transcript provided.
    pub fn with_fallback(mut self, fallback: Arc<dyn SpeechCapture>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Whether an activation without typed text can still capture speech.
    pub fn can_listen(&self) -> bool {
        self.fallback.is_some()
    }

    /// Set the transcript returned by the next activation.
    pub fn provide(&self, transcript: impl Into<String>) {
        if let Ok(mut next) = self.next.lock() {
            *next = Some(transcript.into());
        }
    }
}

#[async_trait]
impl SpeechCapture for TextCapture {
    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>> {
        let transcript = self
            .next
            .lock()
            .ok()
            .and_then(|mut next| next.take())
            .filter(|t| !t.trim().is_empty());
        if transcript.is_none() {
            if let Some(fallback) = &self.fallback {
                return fallback.start_listening().await;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(text) = transcript {
            let _ = tx.send(CaptureEvent::Result(text));
        }
        let _ = tx.send(CaptureEvent::End);
        Ok(rx)
    }
}
