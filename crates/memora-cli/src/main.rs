use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use memora_client::WebhookClient;
use memora_core::controller::{CaptureController, TrackerConfig, TrackerEvent};
use memora_core::seeta::SeetaDetector;
use memora_core::source::FrameSource;
use memora_core::types::{FacingMode, TrackingStatus};
use memora_hw::Camera;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "memora", about = "Memory-aid camera companion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live tracking: watch the camera and recognize whoever holds still
    Track {
        /// Start with the front ("user") camera instead of the rear one
        #[arg(long)]
        front: bool,
        /// Override the stability threshold (consecutive detections)
        #[arg(long)]
        threshold: Option<u32>,
        /// Skip the conversation-starter request after a match
        #[arg(long)]
        no_conversation: bool,
    },
    /// Recognize a single photo file
    Recognize {
        /// Path to a JPEG/PNG photo
        photo: PathBuf,
    },
    /// List people enrolled for the configured patient
    People,
    /// List available camera devices
    Devices,
    /// Camera diagnostics: open, grab a frame, report
    Test {
        /// Write the grabbed frame as JPEG to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Track {
            front,
            threshold,
            no_conversation,
        } => run_track(config, front, threshold, no_conversation).await,
        Commands::Recognize { photo } => run_recognize(config, photo).await,
        Commands::People => run_people(config).await,
        Commands::Devices => run_devices(),
        Commands::Test { output } => run_test(config, output),
    }
}

async fn run_track(
    config: Config,
    front: bool,
    threshold: Option<u32>,
    no_conversation: bool,
) -> Result<()> {
    let facing = if front {
        FacingMode::User
    } else {
        FacingMode::Environment
    };

    let camera = Camera::open(
        config.device_map(),
        facing,
        config.jpeg_quality,
        config.warmup_frames,
    )
    .context("could not access camera — check device path and permissions, then try again")?;

    let detector = SeetaDetector::load(&config.model_path)
        .context("face detection unavailable — model failed to load")?;

    let tracker_config = TrackerConfig {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        stable_threshold: threshold.unwrap_or(config.stable_threshold),
        smoothing_window: config.smoothing_window,
        facing,
        display_size: None,
    };

    let client = Arc::new(WebhookClient::new(config.endpoints(), config.user_id.clone()));
    let (handle, mut events) = CaptureController::spawn(camera, detector, tracker_config);

    println!("Tracking started. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
                println!("\nStopped.");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TrackerEvent::StatusChanged(status) => print_status(status),
                    TrackerEvent::FacePosition(Some(face)) => {
                        tracing::debug!(x = face.x, y = face.y, w = face.width, h = face.height, "face position");
                    }
                    TrackerEvent::FacePosition(None) => {}
                    TrackerEvent::CaptureReady { photo, face } => {
                        tracing::info!(bytes = photo.jpeg.len(), x = face.x, y = face.y, "frame captured");
                        handle_capture(&client, &config, photo.to_base64(), no_conversation).await;
                        let shown = display_window(
                            Duration::from_secs(config.result_display_secs),
                            async {
                                let _ = tokio::signal::ctrl_c().await;
                            },
                        )
                        .await;
                        if !shown {
                            handle.stop();
                            println!("\nStopped.");
                            break;
                        }
                        handle.resume();
                    }
                    TrackerEvent::Error(e) => {
                        eprintln!("Camera failed: {e}. Restart tracking to try again.");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Post a capture to the recognition endpoint and show the result.
async fn handle_capture(
    client: &Arc<WebhookClient>,
    config: &Config,
    photo_base64: String,
    no_conversation: bool,
) {
    let patient_id = config.patient_id;
    let result = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || client.recognize(patient_id, &photo_base64)).await
    };

    let response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            eprintln!("Recognition request failed: {e}");
            return;
        }
        Err(e) => {
            eprintln!("Recognition task failed: {e}");
            return;
        }
    };

    let Some(person) = response.person.filter(|_| response.matched) else {
        let message = response
            .message
            .unwrap_or_else(|| "nobody recognized".to_string());
        println!("No match ({message}). Hold still to scan again.");
        return;
    };

    println!("── This is {} ──", person.name);
    if let Some(nickname) = &person.nickname {
        println!("   You call them {nickname}");
    }
    println!("   Your {}", person.relationship.to_lowercase());
    if let Some(details) = &person.details {
        println!("   {details}");
    }
    if let Some(confidence) = response.confidence {
        tracing::info!(?confidence, "match confidence");
    }

    if no_conversation {
        return;
    }

    let context = person.conversation_context();
    let language = config.language.clone();
    let conversation = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || client.generate_conversation(&context, &language)).await
    };
    match conversation {
        Ok(Ok(starter)) => println!("   Try asking: {starter}"),
        Ok(Err(e)) => tracing::warn!(error = %e, "conversation generation failed"),
        Err(e) => tracing::warn!(error = %e, "conversation task failed"),
    }
}

/// Hold the recognition result on screen for `delay`, cutting the wait
/// short when `shutdown` completes. Returns false when interrupted.
async fn display_window(delay: Duration, shutdown: impl std::future::Future<Output = ()>) -> bool {
    tokio::select! {
        _ = shutdown => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn print_status(status: TrackingStatus) {
    match status {
        TrackingStatus::Loading => println!("Loading…"),
        TrackingStatus::Detecting => println!("Looking for a face…"),
        TrackingStatus::Stable => println!("Face found — hold still…"),
        TrackingStatus::Capturing => println!("Recognizing…"),
    }
}

async fn run_recognize(config: Config, photo: PathBuf) -> Result<()> {
    let bytes = std::fs::read(&photo)
        .with_context(|| format!("could not read photo: {}", photo.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    let client = WebhookClient::new(config.endpoints(), config.user_id.clone());
    let patient_id = config.patient_id;
    let response =
        tokio::task::spawn_blocking(move || client.recognize(patient_id, &encoded)).await??;

    if let Some(person) = response.person.filter(|_| response.matched) {
        println!("Matched: {} ({})", person.name, person.relationship);
    } else {
        println!(
            "No match{}",
            response
                .message
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_people(config: Config) -> Result<()> {
    let client = WebhookClient::new(config.endpoints(), config.user_id.clone());
    let patient_id = config.patient_id;
    let response = tokio::task::spawn_blocking(move || client.get_people(patient_id)).await??;

    let people = response.data.unwrap_or_default();
    if people.is_empty() {
        println!("No people enrolled yet.");
        return Ok(());
    }
    for person in people {
        let nickname = person
            .nickname
            .as_deref()
            .map(|n| format!(" \"{n}\""))
            .unwrap_or_default();
        println!(
            "{:>4}  {}{}  — {}",
            person.id.map(|id| id.to_string()).unwrap_or_default(),
            person.name,
            nickname,
            person.relationship
        );
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found.");
        return Ok(());
    }
    for device in devices {
        println!("{}  {} ({})", device.path, device.name, device.driver);
    }
    Ok(())
}

fn run_test(config: Config, output: Option<PathBuf>) -> Result<()> {
    println!("Opening {}…", config.rear_device);
    let mut camera = Camera::open(
        config.device_map(),
        FacingMode::Environment,
        config.jpeg_quality,
        config.warmup_frames,
    )?;
    println!("Resolution: {}x{}", camera.width(), camera.height());

    // Poll past warmup until a decodable frame arrives.
    let mut frame = None;
    for _ in 0..(config.warmup_frames + 16) {
        if let Some(f) = camera.poll_frame()? {
            frame = Some(f);
            break;
        }
    }
    let frame = frame.context("camera produced no decodable frame")?;
    println!(
        "Frame OK — avg brightness {:.1}",
        memora_hw::frame::avg_brightness(&frame.gray)
    );

    if let Some(path) = output {
        let photo = camera.capture_photo()?;
        std::fs::write(&path, &photo.jpeg)
            .with_context(|| format!("could not write {}", path.display()))?;
        println!("Snapshot written to {}", path.display());
    }

    camera.shutdown();
    Ok(())
}
