//! A synthesizer that prints instead of speaking.
//!
//! Used with `--silent` and on machines without a speech engine.

use super::{SpeechSynthesizer, Voice, VoiceParams};
use crate::error::Result;
use async_trait::async_trait;
use std::io::Write;

/// Writes each utterance to stdout on its own line.
#[derive(Debug, Clone)]
pub struct ConsoleSynthesizer {
    prefix: String,
}

impl Default for ConsoleSynthesizer {
    fn default() -> Self {
        Self::new("assistant> ")
    }
}

impl ConsoleSynthesizer {
    /// Create a console synthesizer that prefixes every line with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    fn name(&self) -> &str {
        "console"
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        Ok(Vec::new())
    }

    async fn speak(&self, text: &str, _voice: Option<&Voice>, _params: &VoiceParams) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}{text}", self.prefix)?;
        stdout.flush()?;
        Ok(())
    }
}
