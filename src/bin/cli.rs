//! CLI binary for hevar.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use hevar::capture::{SpeechCapture, TextCapture};
use hevar::config::QueryMode;
use hevar::tts::{ConsoleSynthesizer, SpeechSynthesizer, select_voice};
use hevar::{
    AssistantConfig, AssistantEvent, InteractionController, InteractionStatus, PlaybackQueue,
    api::QueryClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Hevar Assistant: ask questions, hear the answers as they stream in.
#[derive(Parser)]
#[command(name = "hevar", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the answering service.
    #[arg(long, env = "HEVAR_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token for the answering service.
    #[arg(long, env = "HEVAR_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Wait for the complete answer instead of streaming it.
    #[arg(long)]
    batch: bool,

    /// Print answers instead of speaking them.
    #[arg(long)]
    silent: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Interactive session: type a question, or press Enter to speak one.
    Chat,

    /// Ask a single question and wait for the spoken answer.
    Ask {
        /// The question.
        query: String,
    },

    /// List the speech engine's voices.
    Voices,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hevar=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Chat);

    if let Command::InitConfig { force } = command {
        return init_config(cli.config, force);
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if cli.token.is_some() {
        config.api.token = cli.token;
    }
    if cli.batch {
        config.pipeline.mode = QueryMode::Batch;
    }

    match command {
        Command::Chat => run_chat(config, cli.silent).await,
        Command::Ask { query } => run_ask(config, cli.silent, query).await,
        Command::Voices => list_voices(&config).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<AssistantConfig> {
    if let Some(path) = explicit {
        return AssistantConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    let path = AssistantConfig::default_config_path();
    if path.exists() {
        info!("using config {}", path.display());
        Ok(AssistantConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?)
    } else {
        Ok(AssistantConfig::default())
    }
}

fn init_config(explicit: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = explicit.unwrap_or_else(AssistantConfig::default_config_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AssistantConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn synthesizer(config: &AssistantConfig, silent: bool) -> Arc<dyn SpeechSynthesizer> {
    if silent {
        return Arc::new(ConsoleSynthesizer::default());
    }
    match hevar::tts::from_config(&config.tts) {
        Ok(synth) => synth,
        Err(e) => {
            warn!("{e}; printing answers instead");
            Arc::new(ConsoleSynthesizer::default())
        }
    }
}

fn controller(
    config: &AssistantConfig,
    silent: bool,
    capture: Arc<dyn SpeechCapture>,
) -> anyhow::Result<InteractionController> {
    let backend = Arc::new(QueryClient::new(config.api.clone())?);
    let playback = PlaybackQueue::spawn(synthesizer(config, silent), &config.tts);
    Ok(InteractionController::new(
        config.pipeline.clone(),
        capture,
        backend,
        playback,
    ))
}

/// Print controller events until the channel closes.
fn spawn_event_printer(controller: &InteractionController, print_sentences: bool) {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AssistantEvent::Status(status)) => println!("[{status}]"),
                Ok(AssistantEvent::Transcript(text)) => println!("you> {text}"),
                Ok(AssistantEvent::Sentence(chunk)) if print_sentences => {
                    println!("assistant> {}", chunk.text);
                }
                Ok(AssistantEvent::Sentence(_)) => {}
                Ok(AssistantEvent::Error(message)) => eprintln!("error: {message}"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event printer lagged by {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run_chat(config: AssistantConfig, silent: bool) -> anyhow::Result<()> {
    println!("Hevar Assistant v{}", env!("CARGO_PKG_VERSION"));

    let capture = hevar::capture::from_config(&config.capture);
    let can_listen = capture.can_listen();
    let controller = controller(&config, silent, capture.clone())?;
    spawn_event_printer(&controller, !silent);

    if can_listen {
        println!("\nType a question, or press Enter to speak. Ctrl+C interrupts, twice quits.\n");
    } else {
        println!("\nType a question and press Enter. Ctrl+C interrupts, twice quits.\n");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if controller.status() == InteractionStatus::Idle {
                    info!("received Ctrl+C, shutting down...");
                    break;
                }
                controller.interrupt().await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                handle_line(&controller, &capture, line.trim(), can_listen).await;
            }
        }
    }

    controller.interrupt().await;
    Ok(())
}

async fn handle_line(
    controller: &InteractionController,
    capture: &TextCapture,
    line: &str,
    can_listen: bool,
) {
    if controller.status() != InteractionStatus::Idle {
        if line.is_empty() {
            controller.interrupt().await;
        } else {
            println!("(busy: press Enter to interrupt)");
        }
        return;
    }

    if line.is_empty() {
        if can_listen {
            controller.activate();
        }
        return;
    }
    capture.provide(line);
    controller.activate();
}

async fn run_ask(config: AssistantConfig, silent: bool, query: String) -> anyhow::Result<()> {
    let capture = Arc::new(TextCapture::with_transcript(query));
    let controller = controller(&config, silent, capture)?;
    spawn_event_printer(&controller, !silent);

    controller.activate();
    tokio::select! {
        () = controller.wait_idle() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            controller.interrupt().await;
        }
    }

    match controller.last_error() {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

async fn list_voices(config: &AssistantConfig) -> anyhow::Result<()> {
    let synth = hevar::tts::from_config(&config.tts)?;
    let voices = synth.voices().await?;
    let selected = select_voice(&voices, &config.tts.language, &config.tts.preferred_voices);

    println!("{} voices ({}):", synth.name(), voices.len());
    for voice in &voices {
        let marker = if selected == Some(voice) { "*" } else { " " };
        println!("{marker} {:<32} {}", voice.name, voice.language);
    }
    Ok(())
}
