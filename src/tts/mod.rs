//! Text-to-speech backends.
//!
//! The playback queue is the only caller of a [`SpeechSynthesizer`]; nothing
//! else in the crate talks to a speech engine directly.

mod command;
mod console;

pub use command::CommandSynthesizer;
pub use console::ConsoleSynthesizer;

use crate::config::TtsConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A voice offered by a speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Human-readable voice name (e.g. `Samantha`).
    pub name: String,
    /// Language tag as reported by the engine (e.g. `en-us`, `en_US`).
    pub language: String,
    /// Identifier passed back to the engine to select this voice.
    pub id: String,
}

/// Prosody settings applied to every utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// Language tag used when no voice could be resolved.
    pub language: String,
    /// Rate multiplier, 1.0 = engine default.
    pub rate: f32,
    /// Pitch multiplier, 1.0 = engine default.
    pub pitch: f32,
    /// Volume in `0.0..=1.0`.
    pub volume: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self::from(&TtsConfig::default())
    }
}

impl From<&TtsConfig> for VoiceParams {
    fn from(config: &TtsConfig) -> Self {
        Self {
            language: config.language.clone(),
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume.clamp(0.0, 1.0),
        }
    }
}

/// A speech engine.
///
/// `speak` resolves once the text has been fully rendered. Dropping the
/// returned future must halt speech immediately; that is how playback is
/// interrupted.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// List the voices this engine can speak with.
    async fn voices(&self) -> Result<Vec<Voice>>;

    /// Speak `text` with the given voice (engine default when `None`).
    async fn speak(&self, text: &str, voice: Option<&Voice>, params: &VoiceParams) -> Result<()>;
}

/// Build the synthesizer described by the configuration.
///
/// # Errors
///
/// Returns an error if no usable speech engine is installed.
pub fn from_config(config: &TtsConfig) -> Result<Arc<dyn SpeechSynthesizer>> {
    Ok(Arc::new(CommandSynthesizer::new(config.engine)?))
}

fn normalize_language(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Pick a voice for `language`.
///
/// Preference order: the first language-matched voice, in the engine's
/// listing order, whose name contains any of `preferred_names`; then any
/// language-matched voice; then the first voice available.
pub fn select_voice<'a>(
    voices: &'a [Voice],
    language: &str,
    preferred_names: &[String],
) -> Option<&'a Voice> {
    let wanted = normalize_language(language);
    let matches_language = |v: &&Voice| normalize_language(&v.language) == wanted;
    let preferred: Vec<String> = preferred_names.iter().map(|p| p.to_lowercase()).collect();

    voices
        .iter()
        .filter(matches_language)
        .find(|v| {
            let name = v.name.to_lowercase();
            preferred.iter().any(|p| name.contains(p.as_str()))
        })
        .or_else(|| voices.iter().find(matches_language))
        .or_else(|| voices.first())
}
