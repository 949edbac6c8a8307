//! Folds streamed answer deltas into speakable sentences.
//!
//! The split rule is a latency heuristic, not a tokenizer: a fragment ends
//! after a run of `.`, `!` or `?`. Splitting is attempted when the latest
//! delta carries such punctuation or the buffer has grown past the
//! threshold; whatever follows the last punctuation run stays buffered.

use crate::pipeline::messages::SentenceChunk;

/// Default buffer length (in characters) that forces a split attempt.
pub const DEFAULT_SENTENCE_THRESHOLD: usize = 100;

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Incremental sentence segmenter for one interaction.
#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    threshold: usize,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_SENTENCE_THRESHOLD)
    }
}

impl SentenceSegmenter {
    /// Create a segmenter that forces a split attempt once the buffer holds
    /// more than `threshold` characters.
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: String::new(),
            threshold,
        }
    }

    /// Text received but not yet emitted.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Append a delta and return every sentence it completes, in order.
    pub fn push(&mut self, delta: &str) -> Vec<SentenceChunk> {
        self.buffer.push_str(delta);

        let over_threshold = self.buffer.chars().count() > self.threshold;
        if !delta.chars().any(is_sentence_end) && !over_threshold {
            return Vec::new();
        }

        let mut fragments = split_sentences(&self.buffer);
        // The last fragment is incomplete (possibly empty): keep it buffered.
        let remainder = fragments.pop().unwrap_or_default().to_owned();
        let sentences = fragments
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SentenceChunk {
                text: s.to_owned(),
                is_final: false,
            })
            .collect();
        self.buffer = remainder;
        sentences
    }

    /// End of the answer: emit the remainder as the final sentence.
    ///
    /// Always returns a chunk with `is_final` set. When nothing is left the
    /// text is empty; that placeholder still has to travel through playback
    /// so completion is signalled after the last audio, not before.
    pub fn finish(&mut self) -> SentenceChunk {
        let text = std::mem::take(&mut self.buffer).trim().to_owned();
        SentenceChunk {
            text,
            is_final: true,
        }
    }
}

/// Split after every run of sentence-ending punctuation. The returned slices
/// cover `text` exactly; the last one is what follows the final run.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_sentence_end(c) {
            continue;
        }
        let next_is_end = chars.peek().is_some_and(|&(_, n)| is_sentence_end(n));
        if !next_is_end {
            let end = i + c.len_utf8();
            fragments.push(&text[start..end]);
            start = end;
        }
    }
    fragments.push(&text[start..]);
    fragments
}
