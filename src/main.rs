use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use recipe_dictation::audio::CpalCaptureDevice;
use recipe_dictation::settings::load_settings;
use recipe_dictation::transcription::HttpTranscriptionClient;
use recipe_dictation::{Blob, ClientSettings, RecordingSession};

#[derive(Parser)]
#[command(name = "recipe-dictation", version, about = "Dictate a recipe and transcribe it")]
struct Cli {
    /// Base URL of the recipe API (overrides settings and RECIPE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the default microphone, then transcribe
    Record {
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        seconds: Option<u64>,

        /// Only record; skip the transcription request
        #[arg(long)]
        no_transcribe: bool,
    },
    /// Transcribe an existing WAV file
    Transcribe { file: PathBuf },
}

#[tokio::main]
async fn main() {
    // .env is a development convenience; production uses real env vars
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }
    log::debug!("Settings: {:?}", settings);

    let result = match cli.command {
        Command::Record {
            seconds,
            no_transcribe,
        } => record(&settings, seconds, no_transcribe).await,
        Command::Transcribe { file } => transcribe_file(&settings, file).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_session(settings: &ClientSettings) -> Result<RecordingSession, String> {
    let transcriber = HttpTranscriptionClient::from_settings(settings).map_err(|e| e.to_string())?;
    let device = CpalCaptureDevice::new(settings.fragment_bytes);
    Ok(RecordingSession::new(Arc::new(device), Arc::new(transcriber)))
}

async fn record(
    settings: &ClientSettings,
    seconds: Option<u64>,
    no_transcribe: bool,
) -> Result<(), String> {
    let mut session = build_session(settings)?;

    if !session.start_recording().await {
        return Err("Could not access the microphone".to_string());
    }

    match seconds {
        Some(secs) => {
            println!("Recording for {}s...", secs);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        None => {
            println!("Recording... press Enter to stop");
            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
        }
    }

    let artifact = session
        .stop_and_wait()
        .await
        .ok_or_else(|| "Recording finished without audio".to_string())?;

    println!(
        "Recorded {} bytes ({}) at {}",
        artifact.blob.len(),
        artifact.blob.media_type(),
        artifact.url
    );

    if no_transcribe {
        return Ok(());
    }

    println!("Transcribing...");
    let text = session
        .transcribe_audio()
        .await
        .ok_or_else(|| "Transcription failed (see log)".to_string())?;
    println!("{}", text.trim());
    Ok(())
}

async fn transcribe_file(settings: &ClientSettings, file: PathBuf) -> Result<(), String> {
    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|e| format!("Failed to read {:?}: {}", file, e))?;

    let session = build_session(settings)?;
    let text = session
        .transcribe_blob(&Blob::wav(bytes))
        .await
        .ok_or_else(|| "Transcription failed (see log)".to_string())?;
    println!("{}", text.trim());
    Ok(())
}
