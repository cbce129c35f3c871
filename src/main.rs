use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use upload_pipeline::{
    AudioExtractor, Config, EngineHandle, HttpGateway, PipelineController, RemoteGateway,
    SourceFile, SubmitOutcome,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("upload_pipeline=info,warn")
        .init();

    let matches = Command::new("Upload Pipeline")
        .version("0.1.0")
        .about("Convert a local video to audio, upload it, and request a transcription")
        .arg(
            Arg::new("video")
                .short('i')
                .long("video")
                .value_name("FILE")
                .help("Video file to convert and upload"),
        )
        .arg(
            Arg::new("prompt")
                .short('p')
                .long("prompt")
                .value_name("TEXT")
                .help("Transcription prompt (key words mentioned in the video)"),
        )
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("URL")
                .help("Base URL of the video service (overrides config)"),
        )
        .arg(
            Arg::new("list-prompts")
                .long("list-prompts")
                .help("List the prompt templates offered by the service")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("verbose") {
        info!("Verbose logging enabled");
    }

    // Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    if let Some(server) = matches.get_one::<String>("server") {
        config.server.base_url = server.clone();
    }

    let gateway = HttpGateway::new(
        &config.server.base_url,
        Duration::from_secs(config.server.timeout_seconds),
    )?;

    if matches.get_flag("list-prompts") {
        let templates = gateway.list_prompt_templates().await?;
        for template in templates {
            println!("{}  {}\n    {}", template.id, template.title, template.template);
        }
        return Ok(());
    }

    let video_path = matches
        .get_one::<String>("video")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--video is required (or use --list-prompts)"))?;

    info!("🚀 Upload pipeline starting...");
    info!("📹 Video: {}", video_path.display());
    info!("🌐 Server: {}", config.server.base_url);

    let source = load_source(&video_path, &config).await?;

    let mut extractor = AudioExtractor::new(EngineHandle::global().clone())
        .with_progress(|fraction| info!("Convert progress {}%", (fraction * 100.0).round()));
    extractor.codec = config.audio.codec.clone();
    extractor.bitrate = config.audio.bitrate.clone();

    let mut controller = PipelineController::new(extractor, gateway);
    controller.on_video_uploaded(|id| info!("🎬 Video uploaded: {}", id));

    // Stand-in for the presentational layer: render the status label on
    // every transition.
    let mut status_rx = controller.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let message = status_rx.borrow().message();
            info!("▶ {}", message);
        }
    });

    controller.select_file(source);

    let prompt = matches.get_one::<String>("prompt").map(String::as_str);
    match controller.submit(prompt).await? {
        SubmitOutcome::Completed {
            video,
            transcription,
        } => {
            println!("video id: {}", video);
            println!("{}", transcription);
        }
        SubmitOutcome::Rejected => {
            return Err(anyhow!("submission was rejected before starting"));
        }
    }

    Ok(())
}

/// Collaborator-side input checks: the core leaves container type and file
/// size unbounded, so the CLI enforces them.
async fn load_source(path: &Path, config: &Config) -> Result<SourceFile> {
    let is_mp4 = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("mp4"));
    if !is_mp4 {
        return Err(anyhow!(
            "only {} input is accepted: {}",
            config.upload.accepted_mime,
            path.display()
        ));
    }

    let bytes = tokio::fs::read(path).await?;
    if config.upload.max_file_size > 0 && bytes.len() as u64 > config.upload.max_file_size {
        return Err(anyhow!(
            "file exceeds the configured size limit of {} bytes",
            config.upload.max_file_size
        ));
    }

    Ok(SourceFile::new(bytes, config.upload.accepted_mime.clone()))
}
