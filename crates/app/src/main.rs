mod content_type;
mod metrics;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidpress_core::{
    load_config, validate_config, Compression, Config, ConfigError, EngineGateway, FfmpegEngine,
    InputFile, LoggingConfig, OutputFormat, Resolution, SessionController, SessionStep,
};

#[derive(Parser, Debug)]
#[command(name = "vidpress")]
#[command(about = "Convert a local video to another resolution and container, on this machine")]
struct Args {
    /// Video file to convert
    input: PathBuf,

    /// Output height (720p, 480p, 360p)
    #[arg(short, long, default_value = "720p")]
    resolution: Resolution,

    /// Favor a smaller file over quality
    #[arg(short, long)]
    compress: bool,

    /// Output container (mp4, avi, mov)
    #[arg(short, long, default_value = "mp4")]
    format: OutputFormat,

    /// Offer the finished file under another container of the same family
    /// (e.g. mov for an mp4), or convert again when the families differ
    #[arg(long)]
    save_as: Option<OutputFormat>,

    /// Declared content type; guessed from the extension when absent
    #[arg(long)]
    content_type: Option<String>,

    /// Directory the result is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    // Determine config path
    let config_path = std::env::var("VIDPRESS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vidpress.toml"));

    // Load configuration before logging, which it configures
    let (config, found) = match load_config(&config_path) {
        Ok(config) => (config, true),
        Err(ConfigError::FileNotFound(_)) => (Config::default(), false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load config from {:?}", config_path))
        }
    };
    init_logging(&config.logging);

    if found {
        info!("Configuration loaded from {:?}", config_path);
    } else {
        warn!("No configuration at {:?}, using defaults", config_path);
    }
    validate_config(&config).context("Configuration validation failed")?;

    info!("FFmpeg: {:?}", config.engine.ffmpeg_path);
    info!("Scratch directory: {:?}", config.engine.scratch_dir);
    if let Some(timeout) = config.gateway.job_timeout_secs {
        info!("Job timeout: {}s", timeout);
    }

    // Wire the engine, gateway and session
    let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
    let gateway = Arc::new(EngineGateway::new(
        engine,
        config.engine.binaries(),
        config.gateway.clone(),
    ));
    let controller = Arc::new(SessionController::new(gateway));

    let renderer = tokio::spawn(render::follow(controller.subscribe()));

    // Ctrl+C cancels a running job; the session then fails recoverably
    let interrupt = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                if let Err(e) = controller.cancel().await {
                    warn!("Nothing to cancel: {}", e);
                }
            }
        })
    };

    let outcome = convert(&controller, &args).await;

    interrupt.abort();
    controller.shutdown().await;
    renderer.abort();

    match metrics::encode_metrics() {
        Ok(text) => debug!("Metrics at exit:\n{}", text),
        Err(e) => warn!("{:#}", e),
    }

    let saved = outcome?;
    println!("{}", saved.display());
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Drives one session from file selection to a saved artifact.
async fn convert(controller: &SessionController, args: &Args) -> Result<PathBuf> {
    controller.start().await?;
    expect_step(controller, SessionStep::Ready)?;

    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| content_type::guess(&args.input).to_string());
    let file = InputFile::from_path(&args.input, content_type)
        .await
        .with_context(|| format!("Failed to open {:?}", args.input))?;

    controller.select_file(file).await?;
    expect_step(controller, SessionStep::Configuring)?;

    controller.set_resolution(args.resolution)?;
    controller.set_compression(Compression::from(args.compress))?;
    controller.set_output_format(args.format)?;

    controller.submit().await?;
    expect_step(controller, SessionStep::Complete)?;

    if let Some(format) = args.save_as {
        controller.change_output_format(format).await?;
        expect_step(controller, SessionStep::Complete)?;
    }

    let artifact = controller
        .snapshot()
        .output_artifact
        .context("Session completed without an artifact")?;

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", args.output_dir))?;
    let path = controller
        .presenter()
        .save(&artifact, &args.output_dir)
        .await?;

    info!(
        "Saved {} ({} bytes, {})",
        path.display(),
        artifact.size_bytes,
        artifact.mime_type
    );
    Ok(path)
}

/// Fails with the session's error message unless it reached `step`.
fn expect_step(controller: &SessionController, step: SessionStep) -> Result<()> {
    let session = controller.snapshot();
    if session.step == step {
        return Ok(());
    }
    match session.error {
        Some(error) => bail!("{}", error.message),
        None => bail!("Session ended up {} instead of {}", session.step, step),
    }
}
