//! CLI binary for kaiwa.

use clap::{Parser, Subcommand};
use kaiwa::audio::capture::LocalCapture;
use kaiwa::audio::frame;
use kaiwa::audio::playback::{LocalPlayback, decode_wav};
use kaiwa::llm::ChatApiModel;
use kaiwa::platform::local::{ConsoleSink, LocalPlatform};
use kaiwa::segment::scan_frames;
use kaiwa::stt::WhisperTranscriber;
use kaiwa::tts::VoicevoxSynthesizer;
use kaiwa::{Relay, RelayConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Session and channel id used for the local loopback platform.
const LOCAL_ID: u64 = 0;

/// Kaiwa: a conversational relay for voice channels.
#[derive(Parser)]
#[command(name = "kaiwa", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Talk to the relay through the local microphone and speakers.
    Chat,

    /// Send one text message through the conversation pipeline.
    Text {
        /// The message to send.
        message: String,
    },

    /// List available audio devices.
    Devices,

    /// Segment a recorded WAV clip and print the detected utterances.
    Segment {
        /// Path to the WAV file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing — suppress noisy dependency logs by default.
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kaiwa=info")),
        )
        .init();

    let cli = Cli::parse();

    // Load config
    let mut config = if let Some(ref path) = cli.config {
        RelayConfig::from_file(path)?
    } else {
        let default_path = RelayConfig::default_config_path();
        if default_path.exists() {
            RelayConfig::from_file(&default_path)?
        } else {
            RelayConfig::default()
        }
    };
    config.apply_env_overrides();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Text { message } => run_text(config, &message).await,
        Command::Devices => list_devices(),
        Command::Segment { file } => segment_clip(&config, &file),
    }
}

async fn run_chat(config: RelayConfig) -> anyhow::Result<()> {
    println!("Kaiwa v{}", env!("CARGO_PKG_VERSION"));

    let transcriber = Arc::new(WhisperTranscriber::new(&config.stt));

    // Load the transcription model up front so a bad model path fails
    // here instead of on the first utterance.
    println!("Loading transcription model...");
    let loading = Arc::clone(&transcriber);
    tokio::task::spawn_blocking(move || loading.ensure_loaded()).await??;

    let relay = build_relay(config, transcriber)?;
    relay.join(LOCAL_ID, LOCAL_ID, LOCAL_ID).await?;

    println!("\nReady! Speak into your microphone. Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");
    relay.shutdown().await;

    Ok(())
}

async fn run_text(config: RelayConfig, message: &str) -> anyhow::Result<()> {
    let transcriber = Arc::new(WhisperTranscriber::new(&config.stt));
    let relay = build_relay(config, transcriber)?;
    relay.handle_text(LOCAL_ID, message).await;
    Ok(())
}

fn build_relay(config: RelayConfig, transcriber: Arc<WhisperTranscriber>) -> anyhow::Result<Relay> {
    let model = Arc::new(ChatApiModel::new(&config.llm)?);
    let synthesizer = Arc::new(VoicevoxSynthesizer::new(&config.tts)?);
    let platform = Arc::new(LocalPlatform::new(config.audio.clone()));

    Ok(Relay::new(
        config,
        platform,
        Arc::new(ConsoleSink),
        transcriber,
        model,
        synthesizer,
    ))
}

fn segment_clip(config: &RelayConfig, path: &Path) -> anyhow::Result<()> {
    let wav = std::fs::read(path)?;
    let (mono, source_rate) = decode_wav(&wav)?;
    let frames = frame::to_wire_frames(&mono, source_rate);
    let clip_ms = frames.len() as u64 * u64::from(frame::FRAME_MS);

    println!(
        "{}: {clip_ms}ms of audio (threshold {}, silence window {}ms)",
        path.display(),
        config.segmenter.silence_rms_threshold,
        config.segmenter.silence_duration_ms
    );

    let spans = scan_frames(frames, &config.segmenter);
    for (i, span) in spans.iter().enumerate() {
        println!(
            "  utterance {:>2}: start {:>6}ms, speech {}ms",
            i + 1,
            span.start_ms,
            span.duration_ms
        );
    }
    if spans.is_empty() {
        println!("  no utterances detected");
    }

    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in LocalCapture::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in LocalPlayback::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}
