//! Events emitted by the interaction controller for UI and observability.
//!
//! Lightweight on purpose so the controller can broadcast without waiting
//! on slow observers.

use crate::pipeline::messages::{InteractionStatus, SentenceChunk};

/// What the assistant is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantEvent {
    /// The interaction status changed.
    Status(InteractionStatus),
    /// Final transcript of the user's question.
    Transcript(String),
    /// A speakable unit handed to playback (the filler excluded).
    Sentence(SentenceChunk),
    /// The interaction failed; the message is meant for the user.
    Error(String),
}
