use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use image::ImageReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardscan::capture::replay::ReplaySource;
use cardscan::scanner::cancel_on_signal;
use cardscan::detection::ocr::{OcrsRecognizer, OcrsTextDetector, default_models_dir, init_ocr_engine};
use cardscan::{
    ConsoleDisplay, DebugConfig, FrameSource, LabelDisplay, LogObserver, Orientation, Scanner,
    ScannerConfig,
};

#[derive(Parser)]
#[command(name = "cardscan")]
#[command(about = "Read a 16-digit card number and 4-digit security code from a camera")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR", global = true)]
    models_dir: Option<PathBuf>,

    /// Sampling period in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    interval_ms: Option<u64>,

    /// Minimum detection confidence (exclusive)
    #[arg(long, global = true)]
    confidence: Option<f32>,

    /// Orientation frames are analyzed in
    #[arg(long, value_enum, global = true)]
    orientation: Option<OrientationArg>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR", global = true)]
    debug_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a single still image once
    Scan {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Sample still images as if they came from a camera
    Replay {
        /// Image file or directory of images
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Delay between replayed frames
        #[arg(long, value_name = "MS", default_value_t = 100)]
        frame_interval_ms: u64,

        /// Passes over the images; repeats until Ctrl-C when omitted
        #[arg(long, value_name = "N")]
        loops: Option<u32>,
    },
    /// Scan frames from a V4L2 camera
    #[cfg(feature = "camera")]
    Watch {
        #[arg(long, value_name = "PATH", default_value = cardscan::capture::camera::DEFAULT_DEVICE)]
        device: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "cardscan=debug" } else { "cardscan=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ScannerConfig> {
    let mut config = match &cli.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };

    if let Some(dir) = &cli.models_dir {
        config.models_dir = Some(dir.clone());
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.sample_interval_ms = interval_ms;
    }
    if let Some(confidence) = cli.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(orientation) = cli.orientation {
        config.capture.orientation = orientation.into();
    }

    config.check()?;
    Ok(config)
}

fn build_scanner(cli: &Cli, config: &ScannerConfig) -> anyhow::Result<Scanner> {
    let models_dir = config
        .models_dir
        .clone()
        .or_else(default_models_dir)
        .context("Could not determine the OCR models directory, pass --models-dir")?;

    let engine = Arc::new(init_ocr_engine(&models_dir)?);
    let detector = Arc::new(OcrsTextDetector::new(Arc::clone(&engine)));
    let recognizer = Arc::new(OcrsRecognizer::new(engine));

    let mut scanner = Scanner::from_config(config, detector, recognizer);
    if let Some(debug_dir) = &cli.debug_out {
        scanner = scanner.with_debug(DebugConfig::new(debug_dir.clone())?);
    }
    Ok(scanner)
}

async fn scan_still(scanner: &Scanner, path: &Path) -> anyhow::Result<()> {
    let image = ImageReader::open(path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "image loaded");

    let mut labels = LabelDisplay::new();
    let report = scanner.scan_image(&image, &mut labels, &mut LogObserver).await?;

    println!("\n=== Card Scan Results ===");
    println!("Regions read: {}", report.ocr_calls);
    match (labels.number(), labels.code()) {
        (Some(number), Some(code)) => {
            println!("Card number:   {number}");
            println!("Security code: {code}");
        }
        _ => println!("No card number recognized."),
    }

    Ok(())
}

async fn scan_live<S: FrameSource>(scanner: &Scanner, source: &mut S) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    let mut display = ConsoleDisplay::new();
    let report = scanner
        .run(source, &mut display, &mut LogObserver, cancel)
        .await?;

    println!("\n=== Session {} ===", report.session);
    println!(
        "Ticks: {}  frames processed: {}  OCR calls: {}",
        report.ticks, report.frames_processed, report.ocr_calls
    );
    println!("Accepted: {}  rejected: {}", report.accepted, report.rejected);
    match &report.last_candidate {
        Some(candidate) => println!("Last card: {} / {}", candidate.number, candidate.code),
        None => println!("No card number recognized."),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let scanner = build_scanner(&cli, &config)?;

    match &cli.command {
        Command::Scan { image } => scan_still(&scanner, image).await,
        Command::Replay {
            path,
            frame_interval_ms,
            loops,
        } => {
            let mut source = ReplaySource::new(path.clone(), Duration::from_millis(*frame_interval_ms))
                .with_loops(*loops);
            scan_live(&scanner, &mut source).await
        }
        #[cfg(feature = "camera")]
        Command::Watch { device } => {
            let mut source =
                cardscan::capture::camera::V4lCameraSource::new(device.clone(), config.capture);
            scan_live(&scanner, &mut source).await
        }
    }
}
