//! Error types for the hevar pipeline.

/// Top-level error type for the voice query assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// No speech capture engine is available on this system.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The capture engine reported an error.
    #[error("capture error: {0}")]
    CaptureFailure(String),

    /// Non-success response or network failure talking to the query service.
    #[error("transport error: {0}")]
    TransportFailure(String),

    /// The query stream carried an explicit `error` event.
    #[error("stream error: {0}")]
    StreamProtocol(String),

    /// The speech engine failed to render an utterance.
    #[error("synthesis error: {0}")]
    SynthesisFailure(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl AssistantError {
    /// The single message shown to the user when an interaction fails.
    ///
    /// Transport details stay in the logs; the user only sees what went
    /// wrong from their point of view.
    pub fn user_message(&self) -> String {
        match self {
            Self::CaptureUnavailable(_) => "Speech recognition not supported".to_owned(),
            Self::CaptureFailure(msg) => msg.clone(),
            Self::TransportFailure(_) => "Failed to process query".to_owned(),
            Self::StreamProtocol(msg) if msg.trim().is_empty() => {
                "The assistant could not answer".to_owned()
            }
            Self::StreamProtocol(msg) => msg.trim().to_owned(),
            Self::SynthesisFailure(_) => "Speech playback failed".to_owned(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Io(_) | Self::Channel(_) => "Something went wrong".to_owned(),
        }
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        Self::TransportFailure(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
