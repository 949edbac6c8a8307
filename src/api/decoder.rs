//! Turns a raw SSE byte stream into ordered [`StreamEvent`]s.
//!
//! The decoded stream always ends with exactly one terminal event
//! ([`StreamEvent::End`] or [`StreamEvent::Error`]) and yields nothing after
//! it, whatever the transport does next.

use crate::api::sse::{SseEvent, SseLineParser};
use crate::pipeline::messages::{StreamEvent, StreamFailure};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::debug;

/// A boxed stream of decoded query events.
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Map one SSE event to a pipeline event. `None` means "nothing to emit".
pub fn classify(event: SseEvent) -> Option<StreamEvent> {
    match event.kind() {
        "message" => {
            if event.data.is_empty() || event.is_done() {
                None
            } else {
                Some(StreamEvent::Data(event.data))
            }
        }
        "done" => Some(StreamEvent::End),
        "error" => Some(StreamEvent::Error(StreamFailure::Protocol(
            event.data.trim().to_owned(),
        ))),
        other => {
            debug!("ignoring SSE event of type '{other}'");
            None
        }
    }
}

/// Decode a chunked SSE byte stream.
///
/// Chunks may split lines and events anywhere; the output depends only on
/// the concatenated bytes. A read error yields a single transport error.
/// When the transport ends, any unterminated event is flushed and `End`
/// follows.
pub fn decode_stream<S, B, E>(byte_stream: S) -> StreamEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecoderState {
        byte_stream: Box::pin(byte_stream),
        parser: SseLineParser::new(),
        pending: VecDeque::new(),
        terminal_queued: false,
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.finished = true;
                }
                return Some((event, state));
            }

            if state.finished {
                return None;
            }

            match state.byte_stream.next().await {
                Some(Ok(chunk)) => {
                    for sse_event in state.parser.push(chunk.as_ref()) {
                        state.queue(sse_event);
                    }
                }
                Some(Err(e)) => {
                    state.queue_event(StreamEvent::Error(StreamFailure::Transport(format!(
                        "stream read error: {e}"
                    ))));
                }
                None => {
                    if let Some(sse_event) = state.parser.flush() {
                        state.queue(sse_event);
                    }
                    state.queue_event(StreamEvent::End);
                }
            }
        }
    });

    Box::pin(stream)
}

/// Internal state for the decoded stream.
struct DecoderState<S> {
    byte_stream: Pin<Box<S>>,
    parser: SseLineParser,
    pending: VecDeque<StreamEvent>,
    terminal_queued: bool,
    finished: bool,
}

impl<S> DecoderState<S> {
    fn queue(&mut self, sse_event: SseEvent) {
        if let Some(event) = classify(sse_event) {
            self.queue_event(event);
        }
    }

    fn queue_event(&mut self, event: StreamEvent) {
        if self.terminal_queued {
            return;
        }
        self.terminal_queued = event.is_terminal();
        self.pending.push_back(event);
    }
}
