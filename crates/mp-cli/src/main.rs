use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

mod config;
mod metrics;
mod runner;
mod sink;
mod source;

use config::Config;
use runner::CaptureRunner;

#[derive(Parser, Debug)]
#[command(name = "mp-capture")]
#[command(about = "Rate-gated screen frame conversion pipeline", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "capture.toml")]
    config: PathBuf,

    /// Target frames per second, 0 for unlimited (overrides config)
    #[arg(short, long)]
    fps: Option<u32>,

    /// Number of frames the source delivers, 0 for unlimited (overrides config)
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Take a single snapshot and exit
    #[arg(long)]
    snapshot: bool,

    /// Convert without writing files
    #[arg(long)]
    no_write: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// List available output formats and exit
    #[arg(long)]
    list_formats: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    info!("📸 mp-capture v{}", env!("CARGO_PKG_VERSION"));

    if args.list_formats {
        list_available_formats();
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!("Loading configuration from: {}", args.config.display());
        Config::from_file(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(fps) = args.fps {
        config.capture.target_fps = fps;
    }
    if let Some(frames) = args.frames {
        config.source.frame_count = frames;
    }
    if let Some(output) = args.output {
        config.output.directory = output;
    }
    if args.no_write {
        config.output.write_files = false;
    }

    config.validate()?;

    if let Some(path) = args.dump_config {
        config.to_file(&path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    info!("Configuration:");
    info!("  Target: {} fps (0 = unlimited), crop: {:?}",
          config.capture.target_fps, config.capture.crop);
    info!("  Output: {}", config.capture.output);
    info!("  Source: {}x{} + {} padding px @ {} fps",
          config.source.width, config.source.height,
          config.source.row_padding_pixels, config.source.delivery_fps);

    let mut runner = CaptureRunner::new(config)?;

    if args.snapshot {
        match runner.run_snapshot().await? {
            Some(path) => info!("Snapshot written to {}", path.display()),
            None => info!("Snapshot taken"),
        }
        return Ok(());
    }

    runner.run_continuous().await?;

    info!("Capture stopped gracefully");
    Ok(())
}

fn list_available_formats() {
    println!("Available output formats:");
    let formats = mp_encoder::CodecFactory::list_available_formats();
    for (i, format) in formats.iter().enumerate() {
        println!("  {}. {}", i + 1, format);
    }
}
