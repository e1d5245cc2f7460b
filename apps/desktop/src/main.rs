mod config;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    moderate, CreativeStudio, GenerationRequest, LiveSessionController, LiveSessionEvent,
    LiveSessionRunner, StudioError, TutorChat,
};
use genai_client::GeminiClient;
use media_capture::{SimulatedPresence, SyntheticMediaCapability};
use shared::{
    domain::{format_clock, FilterUpdate, Rotation, SizeTier},
    error::{ApiError, ApiException},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(about = "Live study sessions, image studio and tutor chat")]
struct Cli {
    #[arg(long, default_value = "studio.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a monitored live session with simulated presence detection.
    Live {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
        #[arg(long)]
        presence: Option<f64>,
    },
    /// Generate an image from a prompt and/or a style reference.
    Generate {
        #[arg(default_value = "")]
        prompt: String,
        #[arg(long)]
        style: Option<PathBuf>,
        /// Redraw this image in the style given by --style.
        #[arg(long, requires = "style")]
        transfer_from: Option<PathBuf>,
        #[arg(long, default_value = "1K")]
        size: SizeTier,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply filters and rotation to an image.
    Edit {
        input: PathBuf,
        #[arg(long)]
        brightness: Option<u16>,
        #[arg(long)]
        contrast: Option<u16>,
        #[arg(long)]
        saturation: Option<u16>,
        #[arg(long)]
        grayscale: Option<u16>,
        #[arg(long)]
        sepia: Option<u16>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rotate: i32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Crop an image to its centred square.
    Crop {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Ask the tutor a question.
    Tutor {
        question: String,
        #[arg(long, default_value = "Student")]
        name: String,
    },
    /// Classify a group-chat message.
    Moderate { text: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config);

    if let Err(err) = run(cli.command, settings).await {
        match err.downcast_ref::<ApiException>() {
            Some(api) => {
                if api.code.requires_reauth() {
                    eprintln!("Set GEMINI_API_KEY (or gemini_api_key in the config file) and retry.");
                }
                let body = ApiError::new(api.code, api.message.clone());
                match serde_json::to_string(&body) {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("{api}"),
                }
            }
            None => error!("desktop: command failed err={err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(command: Command, settings: Settings) -> Result<()> {
    match command {
        Command::Live { seconds, presence } => {
            let probability = presence.unwrap_or(settings.presence_probability);
            run_live(Duration::from_secs(seconds), probability).await
        }
        Command::Generate {
            prompt,
            style,
            transfer_from,
            size,
            output,
        } => {
            let studio = studio_for(&settings).await;
            if let Some(style) = style {
                let bytes = read_image(&style)?;
                studio
                    .set_style_reference(&bytes)
                    .await
                    .map_err(studio_failure)?;
            }
            let request = match transfer_from {
                Some(base) => {
                    studio
                        .import_image(&read_image(&base)?)
                        .await
                        .map_err(studio_failure)?;
                    GenerationRequest::style_transfer()
                }
                None => GenerationRequest::new(prompt),
            };
            let png = studio
                .generate(request.with_size(size))
                .await
                .map_err(studio_failure)?;
            write_output(&settings, output, "generated.png", &png)
        }
        Command::Edit {
            input,
            brightness,
            contrast,
            saturation,
            grayscale,
            sepia,
            rotate,
            output,
        } => {
            let rotation = Rotation::from_degrees(rotate)
                .with_context(|| format!("rotation must be a multiple of 90, got {rotate}"))?;
            let studio = studio_for(&settings).await;
            studio
                .import_image(&read_image(&input)?)
                .await
                .map_err(studio_failure)?;
            studio.begin_edit().await.map_err(studio_failure)?;
            studio
                .update_filter(FilterUpdate {
                    brightness,
                    contrast,
                    saturation,
                    grayscale,
                    sepia,
                    rotation: Some(rotation),
                })
                .await
                .map_err(studio_failure)?;
            let png = studio.commit_edit().await.map_err(studio_failure)?;
            write_output(&settings, output, "edited.png", &png)
        }
        Command::Crop { input, output } => {
            let studio = studio_for(&settings).await;
            studio
                .import_image(&read_image(&input)?)
                .await
                .map_err(studio_failure)?;
            let png = studio.crop_to_square().await.map_err(studio_failure)?;
            write_output(&settings, output, "cropped.png", &png)
        }
        Command::Tutor { question, name } => {
            let chat = TutorChat::new(Arc::new(GeminiClient::new(settings.gemini_config())), &name);
            if let Some(greeting) = chat.transcript().await.first() {
                println!("NOVA: {}", greeting.text);
            }
            let reply = chat
                .ask(&question)
                .await
                .map_err(|err| api_failure(ApiError::from(&err)))?;
            println!("NOVA: {}", reply.text);
            Ok(())
        }
        Command::Moderate { text } => {
            let client = GeminiClient::new(settings.gemini_config());
            let verdict = moderate(&client, &text).await;
            println!("{}", serde_json::to_string(&verdict)?);
            Ok(())
        }
    }
}

async fn run_live(duration: Duration, probability: f64) -> Result<()> {
    let controller = LiveSessionController::new(
        Arc::new(SyntheticMediaCapability::new()),
        Arc::new(SimulatedPresence::new(probability)),
    );
    let runner = LiveSessionRunner::new(controller);
    let mut events = runner.subscribe_events();

    let session_id = runner.start().await.map_err(|err| {
        eprintln!("{}", err.user_message());
        api_failure(ApiError::from(&err))
    })?;
    info!("desktop: joined live session id={}", session_id.0);

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                if let Some(summary) = runner.stop().await {
                    println!("Session ended after {}", summary.duration_label());
                }
                break;
            }
            event = events.recv() => match event {
                Ok(LiveSessionEvent::Ticked(snapshot)) => {
                    println!(
                        "{} present={} away={}s",
                        format_clock(snapshot.session_seconds),
                        snapshot.presence,
                        snapshot.away_seconds
                    );
                }
                Ok(event @ LiveSessionEvent::Ended(_)) => {
                    if event.needs_user_notice() {
                        println!("Session ended due to inactivity.");
                    }
                    break;
                }
                Ok(LiveSessionEvent::Started { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

async fn studio_for(settings: &Settings) -> CreativeStudio {
    let studio = CreativeStudio::new(Arc::new(GeminiClient::new(settings.gemini_config())));
    if settings.gemini_api_key.is_some() {
        studio.authorize().await;
    }
    studio
}

fn studio_failure(err: StudioError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    api_failure(ApiError::from(&err))
}

fn api_failure(api: ApiError) -> anyhow::Error {
    anyhow::Error::new(ApiException::new(api.code, api.message))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read image '{}'", path.display()))
}

fn write_output(
    settings: &Settings,
    output: Option<PathBuf>,
    default_name: &str,
    png: &[u8],
) -> Result<()> {
    let path = output.unwrap_or_else(|| settings.output_dir.join(default_name));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create output directory '{}'", parent.display())
        })?;
    }
    fs::write(&path, png).with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("Wrote {} ({} bytes)", path.display(), png.len());
    Ok(())
}
