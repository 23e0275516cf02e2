//! Slidemix - audio mixing and slideshow assembly
//!
//! Command-line host for the media job pipeline. Local files are turned into
//! data URLs and submitted through the same entry points a browser host uses.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slidemix::cli::{Args, Commands};
use slidemix::codec;
use slidemix::config::Config;
use slidemix::host::{Host, CREATE_VIDEO, MIX_AUDIO};
use slidemix::jobs::{CreateVideoRequest, ImageInput, MediaJobs, MixAudioRequest, VideoSettings};
use slidemix::media::EngineFactory;
use slidemix::plan::VideoSize;
use slidemix::progress::ChannelSink;
use slidemix::server;

const DEFAULT_CONFIG: &str = "slidemix.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG).exists() {
                Config::from_file(DEFAULT_CONFIG)?
            } else {
                Config::default()
            }
        }
    };

    let _log_guard = setup_logging(args.verbose, &config.logging.log_dir)?;
    info!("Starting Slidemix");

    match args.command {
        Commands::Mix {
            main,
            background,
            volume,
            duration,
            output,
            dry_run,
        } => {
            let request = MixAudioRequest {
                main: data_url(&main).await?,
                background: data_url(&background).await?,
                volume,
                duration: (duration > 0.0).then_some(duration),
            };

            if dry_run {
                let plan = request.into_job()?.plan();
                println!("{} {}", config.engine.binary_path, plan.command_line());
                return Ok(());
            }

            let call_args = vec![
                json!(request.main),
                json!(request.background),
                json!(request.volume),
                request.duration.map_or(Value::Null, |d| json!(d)),
            ];
            run_job(&config, MIX_AUDIO, &call_args, &output).await?;
        }
        Commands::Video {
            audio,
            frames,
            size,
            width,
            height,
            format,
            quality,
            duration,
            output,
            dry_run,
        } => {
            let (width, height) = match (width, height) {
                (Some(w), Some(h)) => (w, h),
                _ => size.parse::<VideoSize>()?.dimensions(),
            };

            let mut images = Vec::with_capacity(frames.len());
            for (path, seconds) in &frames {
                images.push(ImageInput {
                    data: data_url(path).await?,
                    duration: *seconds,
                });
            }

            let request = CreateVideoRequest {
                audio: data_url(&audio).await?,
                images,
                settings: VideoSettings {
                    width,
                    height,
                    format,
                    quality,
                    duration: (duration > 0.0).then_some(duration),
                },
            };

            if dry_run {
                let plan = request.into_job()?.plan();
                println!("{} {}", config.engine.binary_path, plan.command_line());
                return Ok(());
            }

            let call_args = vec![
                json!(request.audio),
                serde_json::to_value(&request.images)?,
                serde_json::to_value(&request.settings)?,
            ];
            run_job(&config, CREATE_VIDEO, &call_args, &output).await?;
        }
        Commands::Check => {
            let engine = EngineFactory::create_engine(config.engine.clone());
            let version = engine.version().await?;
            println!("{}", version);
        }
        Commands::Serve { port, dir } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = dir {
                config.server.dir = dir;
            }
            server::serve(&config.server).await?;
        }
    }

    Ok(())
}

/// Submit one host call, draw its progress and write the result to `output`
async fn run_job(config: &Config, entry_point: &str, call_args: &[Value], output: &Path) -> Result<()> {
    let engine = EngineFactory::create_engine(config.engine.clone());
    let (sink, mut updates) = ChannelSink::channel(64);
    let jobs = MediaJobs::new(config, engine)?.with_progress_sink(Arc::new(sink));
    let host = Host::new(jobs);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(entry_point.to_string());

    let bar = pb.clone();
    let drawer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            bar.set_position(u64::from(update.percent));
        }
    });

    let handle = host.call(entry_point, call_args);
    info!("Submitted {} as job {}", entry_point, handle.id());
    let outcome = handle.await;

    // Dropping the host closes the progress channel
    drop(host);
    let _ = drawer.await;

    let bytes = match outcome {
        Ok(bytes) => {
            pb.finish_with_message("done");
            bytes
        }
        Err(rejection) => {
            pb.abandon_with_message("failed");
            return Err(rejection.into());
        }
    };

    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

/// Read a local file as a data URL, typed by its extension
async fn data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    Ok(codec::encode(codec::mime_for_extension(extension), &bytes))
}

fn setup_logging(verbose: bool, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "slidemix.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("slidemix.log").display()
    );

    Ok(guard)
}
