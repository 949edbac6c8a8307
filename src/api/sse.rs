//! Server-Sent Events (SSE) framing for streamed answers.
//!
//! Converts a byte stream into [`SseEvent`]s. Handles multi-line `data:`
//! fields, `event:` types, comment lines, and both `\n` and `\r\n` line
//! endings. Lines are split on raw bytes before UTF-8 decoding, so a
//! multi-byte character split across transport chunks decodes the same way
//! no matter where the chunk boundary falls.
//!
//! # SSE Format
//!
//! ```text
//! event: message
//! data: Why did the chicken
//!
//! data: [DONE]
//!
//! event: done
//!
//! ```

/// Payload that marks the end of the answer rather than answer text.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). `None` if not specified.
    pub event_type: Option<String>,
    /// The data payload (from `data:` field(s)). Multiple data lines are joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }

    /// The event type, defaulting to `message`.
    pub fn kind(&self) -> &str {
        self.event_type.as_deref().unwrap_or("message")
    }
}

/// Internal state for building an SSE event from lines.
#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    /// Whether a boundary would produce an event: some data, or an explicit
    /// type (`event: done` is meaningful without a payload).
    fn is_pending(&self) -> bool {
        !self.data_lines.is_empty() || self.event_type.is_some()
    }

    /// Build the event and reset state.
    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }

    /// Process a single line of SSE input (line terminator already removed).
    ///
    /// Returns `Some(SseEvent)` when an empty line (event boundary) is
    /// encountered and an event is pending.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line = event boundary
        if line.is_empty() {
            if self.is_pending() {
                return Some(self.build());
            }
            return None;
        }

        // Comment line (starts with ':')
        if line.starts_with(':') {
            return None;
        }

        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_owned()),
                "event" => self.event_type = Some(value.trim().to_owned()),
                // id, retry and unknown fields carry nothing we use
                _ => {}
            }
        }

        None
    }
}

/// Parse a line into (field, value). A single leading space is stripped from
/// the value; everything after it is kept verbatim.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon_pos = line.find(':')?;
    let field = &line[..colon_pos];
    let value = &line[colon_pos + 1..];
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Incrementally parse SSE bytes, yielding events as they become complete.
///
/// Feed chunks via [`SseLineParser::push`]; call [`SseLineParser::flush`]
/// once the transport is exhausted.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    /// Create a new incremental SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes into the parser.
    ///
    /// Returns every event completed by this chunk, in order. A trailing
    /// partial line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.line_buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        let mut start = 0;
        while let Some(offset) = self.line_buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let raw = &self.line_buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw);
            if let Some(event) = self.builder.process_line(&line) {
                events.push(event);
            }
            start = end + 1;
        }
        self.line_buffer.drain(..start);

        events
    }

    /// Flush any remaining buffered data as a final event.
    ///
    /// Call this when the stream ends to emit an event whose terminating
    /// blank line never arrived.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let raw = std::mem::take(&mut self.line_buffer);
            let raw = raw.strip_suffix(b"\r").unwrap_or(&raw);
            let line = String::from_utf8_lossy(raw);
            if let Some(event) = self.builder.process_line(&line) {
                return Some(event);
            }
        }

        if self.builder.is_pending() {
            Some(self.builder.build())
        } else {
            None
        }
    }
}
