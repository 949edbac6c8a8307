//! Message types passed between pipeline stages.

use tokio::sync::oneshot;

/// Event produced by a speech capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Final transcript of the user's utterance.
    Result(String),
    /// Capture stopped. May arrive with or without a prior `Result`.
    End,
    /// Capture failed.
    Error(String),
}

/// Why a query stream failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// Non-success response or network failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service sent an explicit `error` event.
    #[error("service reported an error: {0}")]
    Protocol(String),
}

impl From<StreamFailure> for crate::error::AssistantError {
    fn from(failure: StreamFailure) -> Self {
        match failure {
            StreamFailure::Transport(msg) => Self::TransportFailure(msg),
            StreamFailure::Protocol(msg) => Self::StreamProtocol(msg),
        }
    }
}

/// A decoded event from the query stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text delta of the answer.
    Data(String),
    /// No more data will arrive.
    End,
    /// The stream failed. No further events follow.
    Error(StreamFailure),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error(_))
    }
}

/// A sentence accumulated from answer deltas, ready for TTS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceChunk {
    /// Complete sentence text. Empty for the end-of-answer placeholder.
    pub text: String,
    /// Whether this is the last sentence in the response.
    pub is_final: bool,
}

impl SentenceChunk {
    /// The empty final unit that closes an answer with nothing left to say.
    pub fn placeholder() -> Self {
        Self {
            text: String::new(),
            is_final: true,
        }
    }
}

/// Identifier assigned to an utterance when it is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub(crate) u64);

/// How an utterance finished rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    /// The engine finished speaking it.
    Spoken,
    /// The engine failed. The queue moved on regardless.
    Failed(String),
}

/// One unit of text scheduled for speech synthesis.
#[derive(Debug)]
pub struct Utterance {
    /// Text to speak. May be empty (completion placeholder).
    pub text: String,
    pub(crate) on_complete: Option<oneshot::Sender<UtteranceOutcome>>,
}

impl Utterance {
    /// An utterance nobody waits on.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            on_complete: None,
        }
    }

    /// An utterance whose completion can be awaited on the returned receiver.
    ///
    /// The receiver errors if the utterance is discarded by `clear()` or
    /// `cancel()` instead of being rendered.
    pub fn with_completion(
        text: impl Into<String>,
    ) -> (Self, oneshot::Receiver<UtteranceOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                text: text.into(),
                on_complete: Some(tx),
            },
            rx,
        )
    }

    /// Deliver the outcome to whoever awaits it. Consumes the utterance so the
    /// completion can fire at most once.
    pub(crate) fn complete(self, outcome: UtteranceOutcome) {
        if let Some(tx) = self.on_complete {
            let _ = tx.send(outcome);
        }
    }
}

/// Status of the interaction controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InteractionStatus {
    /// Waiting for the user to start an interaction.
    #[default]
    Idle,
    /// Capturing the user's question.
    Listening,
    /// Waiting for the answer.
    Processing,
    /// Speaking the answer.
    Speaking,
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(s)
    }
}
