//! Configuration types for the voice query pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Query service connection settings.
    pub api: ApiConfig,
    /// Response pipeline behaviour.
    pub pipeline: PipelineConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Speech capture settings.
    pub capture: CaptureConfig,
}

/// Query service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the answering service, without a trailing slash.
    pub base_url: String,
    /// Path of the batch query endpoint.
    pub query_path: String,
    /// Path of the streaming (SSE) query endpoint.
    pub stream_path: String,
    /// Bearer token attached to every request. No header is sent when unset.
    pub token: Option<String>,
    /// Request timeout in seconds. Applies to the whole response, so keep it
    /// generous for long streamed answers.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            query_path: "/query".to_owned(),
            stream_path: "/query/stream".to_owned(),
            token: None,
            timeout_secs: 60,
        }
    }
}

impl ApiConfig {
    /// Join the base URL and an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// How the answer is fetched from the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Stream the answer over SSE and speak it sentence by sentence.
    #[default]
    Streaming,
    /// Wait for the complete answer, then speak it in one utterance.
    Batch,
}

/// What happens to the filler utterance once real content arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillerPolicy {
    /// Halt the filler (or drop it if it has not started) before speaking.
    #[default]
    Interrupt,
    /// Let the filler finish; real content plays right after it.
    Finish,
}

/// Response pipeline behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Batch or streaming answers.
    pub mode: QueryMode,
    /// Accumulator length (in characters) past which the segmenter splits
    /// even if the latest delta had no sentence punctuation.
    pub sentence_threshold: usize,
    /// Phrase spoken while the answer is being produced. Empty disables it.
    pub filler_text: String,
    /// Filler handling once the first real content arrives.
    pub filler_policy: FillerPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: QueryMode::Streaming,
            sentence_threshold: 100,
            filler_text: "Let me think about that.".to_owned(),
            filler_policy: FillerPolicy::Interrupt,
        }
    }
}

/// Speech engine used by the default synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsEngine {
    /// Pick `say` on macOS, otherwise `espeak-ng`, otherwise `espeak`.
    #[default]
    Auto,
    /// eSpeak NG (`espeak-ng`).
    EspeakNg,
    /// Classic eSpeak (`espeak`).
    Espeak,
    /// macOS `say`.
    Say,
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Speech engine.
    pub engine: TtsEngine,
    /// BCP-47 language tag used to pick a voice (e.g. `en-US`).
    pub language: String,
    /// Case-insensitive name fragments preferred among language-matched voices.
    pub preferred_voices: Vec<String>,
    /// Speaking rate multiplier (1.0 = engine default).
    pub rate: f32,
    /// Pitch multiplier (1.0 = engine default).
    pub pitch: f32,
    /// Volume in `0.0..=1.0`.
    pub volume: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::Auto,
            language: "en-US".to_owned(),
            preferred_voices: vec!["google".to_owned(), "samantha".to_owned(), "alex".to_owned()],
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// External speech-to-text command. It must record one utterance and
    /// print the final transcript on stdout. When unset, input is typed.
    pub command: Option<String>,
    /// Extra arguments passed to `command`.
    pub args: Vec<String>,
    /// Recognition language, exported to the command as `HEVAR_LANGUAGE`.
    pub language: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            language: "en-US".to_owned(),
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/hevar/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("hevar").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("hevar")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/hevar-config/config.toml")
        }
    }
}
