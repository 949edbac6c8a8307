//! Speech through an installed command-line engine (`espeak-ng`, `espeak`
//! or macOS `say`).
//!
//! Text is written to the engine's stdin so leading dashes or quotes in an
//! answer are never parsed as flags. The child process is killed when the
//! `speak` future is dropped.

use super::{SpeechSynthesizer, Voice, VoiceParams};
use crate::config::TtsEngine;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Engine default speaking rate in words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
/// eSpeak pitch at multiplier 1.0 (range 0..=99).
const BASE_ESPEAK_PITCH: f32 = 50.0;
/// eSpeak amplitude at volume 1.0 (range 0..=200).
const BASE_ESPEAK_AMPLITUDE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Espeak,
    Say,
}

/// A [`SpeechSynthesizer`] that shells out to a speech binary.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    flavor: Flavor,
    program: PathBuf,
    name: String,
}

impl CommandSynthesizer {
    /// Locate the engine on `PATH`.
    ///
    /// `Auto` tries `say` on macOS, then `espeak-ng`, then `espeak`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::SynthesisFailure`] if no candidate binary is
    /// installed.
    pub fn new(engine: TtsEngine) -> Result<Self> {
        let candidates: &[(&str, Flavor)] = match engine {
            TtsEngine::Auto if cfg!(target_os = "macos") => &[
                ("say", Flavor::Say),
                ("espeak-ng", Flavor::Espeak),
                ("espeak", Flavor::Espeak),
            ],
            TtsEngine::Auto => &[("espeak-ng", Flavor::Espeak), ("espeak", Flavor::Espeak)],
            TtsEngine::EspeakNg => &[("espeak-ng", Flavor::Espeak)],
            TtsEngine::Espeak => &[("espeak", Flavor::Espeak)],
            TtsEngine::Say => &[("say", Flavor::Say)],
        };

        for (binary, flavor) in candidates {
            if let Ok(program) = which::which(binary) {
                debug!("using speech engine {}", program.display());
                return Ok(Self::with_program(program, *flavor, binary));
            }
        }

        let names: Vec<&str> = candidates.iter().map(|(b, _)| *b).collect();
        Err(AssistantError::SynthesisFailure(format!(
            "no speech engine found (looked for {})",
            names.join(", ")
        )))
    }

    fn with_program(program: PathBuf, flavor: Flavor, name: &str) -> Self {
        Self {
            flavor,
            program,
            name: name.to_owned(),
        }
    }

    /// Path of the engine binary in use.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn speak_args(&self, voice: Option<&Voice>, params: &VoiceParams) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * params.rate).round().clamp(80.0, 450.0);
        match self.flavor {
            Flavor::Espeak => {
                let pitch = (BASE_ESPEAK_PITCH * params.pitch).round().clamp(0.0, 99.0);
                let amplitude = (BASE_ESPEAK_AMPLITUDE * params.volume)
                    .round()
                    .clamp(0.0, 200.0);
                let voice_id = voice
                    .map(|v| v.id.clone())
                    .unwrap_or_else(|| params.language.to_ascii_lowercase());
                vec![
                    "-v".to_owned(),
                    voice_id,
                    "-s".to_owned(),
                    format!("{wpm}"),
                    "-p".to_owned(),
                    format!("{pitch}"),
                    "-a".to_owned(),
                    format!("{amplitude}"),
                    "--stdin".to_owned(),
                ]
            }
            Flavor::Say => {
                let mut args = Vec::new();
                if let Some(v) = voice {
                    args.push("-v".to_owned());
                    args.push(v.id.clone());
                }
                args.push("-r".to_owned());
                args.push(format!("{wpm}"));
                args
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        let list_args: &[&str] = match self.flavor {
            Flavor::Espeak => &["--voices"],
            Flavor::Say => &["-v", "?"],
        };
        let output = Command::new(&self.program)
            .args(list_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(AssistantError::SynthesisFailure(format!(
                "{} could not list voices: {}",
                self.name, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(match self.flavor {
            Flavor::Espeak => parse_espeak_voices(&stdout),
            Flavor::Say => parse_say_voices(&stdout),
        })
    }

    async fn speak(&self, text: &str, voice: Option<&Voice>, params: &VoiceParams) -> Result<()> {
        let args = self.speak_args(voice, params);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} exited with {}: {}", self.name, output.status, stderr.trim());
            Err(AssistantError::SynthesisFailure(format!(
                "{} exited with {}",
                self.name, output.status
            )))
        }
    }
}

/// Parse `espeak --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(Voice {
                name: cols[3].replace('_', " "),
                language: cols[1].to_owned(),
                id: cols[1].to_owned(),
            })
        })
        .collect()
}

/// Parse `say -v ?` output. Names may contain spaces, so the language tag
/// is taken as the last token before the `#` comment.
///
/// ```text
/// Samantha            en_US    # Hello! My name is Samantha.
/// Bad News            en_US    # The light you see at the end of the tunnel...
/// ```
fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim();
            let (name, language) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Voice {
                name: name.to_owned(),
                language: language.to_owned(),
                id: name.to_owned(),
            })
        })
        .collect()
}
