//! Hevar: a voice query assistant with a real-time response pipeline.
//!
//! A spoken (or typed) question is sent to a remote answering service and
//! the answer is spoken back while it is still streaming in:
//! Capture → Query → SSE decode → Sentence segmentation → Playback
//!
//! # Architecture
//!
//! - **Capture**: produces the transcript ([`capture`])
//! - **Query client**: batch and SSE streaming requests ([`api`])
//! - **Segmenter**: folds answer deltas into speakable sentences
//! - **Playback queue**: speaks utterances one at a time, in order
//! - **Interaction controller**: the state machine tying it together,
//!   including the filler phrase and interruption

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod session;
pub mod tts;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::controller::InteractionController;
pub use pipeline::messages::InteractionStatus;
pub use pipeline::playback::PlaybackQueue;
pub use runtime::AssistantEvent;
pub use session::SessionId;
