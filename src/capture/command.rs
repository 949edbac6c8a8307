//! Capture through an external speech-to-text command.
//!
//! The command records one utterance and prints the transcript on stdout.
//! It receives the recognition language in `HEVAR_LANGUAGE`.

use super::SpeechCapture;
use crate::config::CaptureConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::CaptureEvent;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runs the configured recognizer once per activation.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    config: CaptureConfig,
}

impl CommandCapture {
    /// Create a capture from configuration. The command is resolved when
    /// listening starts, not here.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechCapture for CommandCapture {
    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>> {
        let command = self.config.command.as_deref().unwrap_or_default();
        let program = which::which(command).map_err(|e| {
            AssistantError::CaptureUnavailable(format!("capture command '{command}': {e}"))
        })?;

        let child = Command::new(&program)
            .args(&self.config.args)
            .env("HEVAR_LANGUAGE", &self.config.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AssistantError::CaptureUnavailable(format!("{}: {e}", program.display()))
            })?;
        debug!("capture started: {}", program.display());

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let event = match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let transcript = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                    if transcript.is_empty() {
                        None
                    } else {
                        Some(CaptureEvent::Result(transcript))
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!("capture command exited with {}: {}", output.status, stderr.trim());
                    Some(CaptureEvent::Error("Speech recognition error".to_owned()))
                }
                Err(e) => {
                    warn!("capture command failed: {e}");
                    Some(CaptureEvent::Error("Speech recognition error".to_owned()))
                }
            };
            let failed = matches!(event, Some(CaptureEvent::Error(_)));
            if let Some(event) = event {
                let _ = tx.send(event);
            }
            if !failed {
                let _ = tx.send(CaptureEvent::End);
            }
        });

        Ok(rx)
    }
}
