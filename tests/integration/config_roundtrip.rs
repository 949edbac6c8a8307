//! Configuration file tests: a fully populated file loads as written, and
//! the generated default file loads back to the defaults.

use hevar::AssistantConfig;
use hevar::config::{FillerPolicy, QueryMode, TtsEngine};
use hevar::tts::VoiceParams;
use std::fs;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
# Hevar Assistant configuration

[api]
base_url = "https://answers.example.com"
query_path = "/v1/query"
stream_path = "/v1/query/stream"
token = "secret-token"
timeout_secs = 120

[pipeline]
mode = "batch"
sentence_threshold = 80
filler_text = "One moment."
filler_policy = "finish"

[tts]
engine = "espeak-ng"
language = "en-GB"
preferred_voices = ["daniel"]
rate = 1.25
pitch = 0.9
volume = 0.8

[capture]
command = "whisper-listen"
args = ["--model", "base.en"]
language = "en-GB"
"#;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).expect("failed to write config");
    (dir, path)
}

#[test]
fn fully_populated_file_loads_as_written() {
    let (_dir, path) = write_config(FULL_CONFIG);
    let config = AssistantConfig::from_file(&path).unwrap();

    assert_eq!(
        config.api.endpoint(&config.api.stream_path),
        "https://answers.example.com/v1/query/stream"
    );
    assert_eq!(config.api.token.as_deref(), Some("secret-token"));
    assert_eq!(config.api.timeout().as_secs(), 120);

    assert_eq!(config.pipeline.mode, QueryMode::Batch);
    assert_eq!(config.pipeline.sentence_threshold, 80);
    assert_eq!(config.pipeline.filler_text, "One moment.");
    assert_eq!(config.pipeline.filler_policy, FillerPolicy::Finish);

    assert_eq!(config.tts.engine, TtsEngine::EspeakNg);
    assert_eq!(config.tts.preferred_voices, vec!["daniel"]);
    let params = VoiceParams::from(&config.tts);
    assert_eq!(params.language, "en-GB");
    assert!((params.rate - 1.25).abs() < f32::EPSILON);

    assert_eq!(config.capture.command.as_deref(), Some("whisper-listen"));
    assert_eq!(config.capture.args, vec!["--model", "base.en"]);
}

#[test]
fn default_file_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hevar").join("config.toml");

    AssistantConfig::default().save_to_file(&path).unwrap();
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[pipeline]"));
    assert!(written.contains("mode = \"streaming\""));
    assert!(!written.contains("token"), "unset token must not be written");

    let loaded = AssistantConfig::from_file(&path).unwrap();
    let defaults = AssistantConfig::default();
    assert_eq!(loaded.api.base_url, defaults.api.base_url);
    assert_eq!(loaded.pipeline.filler_text, defaults.pipeline.filler_text);
    assert_eq!(loaded.tts.preferred_voices, defaults.tts.preferred_voices);
    assert_eq!(loaded.tts.engine, TtsEngine::Auto);
}

#[test]
fn unknown_enum_value_is_a_config_error() {
    let (_dir, path) = write_config("[pipeline]\nmode = \"telepathy\"\n");
    let err = AssistantConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, hevar::AssistantError::Config(_)), "{err:?}");
}
