use std::{error::Error, path::PathBuf};

use calib_video::{
    CalibrationConfig, CalibrationError, CalibrationPipeline, CancellationToken, DebugFrameWriter,
    DiagnosticSink, ImageSequenceSource, LogSink,
};
use clap::Parser;
use log::warn;

/// Calibrate a camera from checkerboard frames extracted from a video.
#[derive(Debug, Parser)]
#[command(author, version, about = "Camera calibration from a checkerboard video")]
struct Args {
    /// Directory of extracted frames, processed in file-name order.
    frames_dir: PathBuf,

    /// Optional path to a JSON CalibrationConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the calibration report as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save frames without a detected board into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Read at most this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Fail when the mean reprojection error exceeds this many pixels.
    #[arg(long)]
    max_mean_error: Option<f64>,

    /// Log per-frame detail.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(thiserror::Error, Debug)]
#[error("mean reprojection error {mean:.4}px exceeds the limit of {limit}px")]
struct AccuracyError {
    mean: f64,
    limit: f64,
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = calib_video::core::init_with_level(level) {
        eprintln!("logger already installed: {e}");
    }
}

// Verbosity comes from RUST_LOG here.
#[cfg(feature = "tracing")]
fn init_logging(_verbose: bool) {
    let _ = tracing_log::LogTracer::init();
    calib_video::core::init_tracing(false);
}

fn main() {
    if let Err(err) = try_main() {
        match err.downcast_ref::<CalibrationError>() {
            Some(CalibrationError::InsufficientSamples { found: 0, .. }) => {
                eprintln!("error: no checkerboard was detected in any frame");
            }
            _ => eprintln!("error: {err}"),
        }
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig::default(),
    };
    let pipeline = CalibrationPipeline::new(config)?;

    let mut frames = ImageSequenceSource::from_dir(&args.frames_dir)?;
    if let Some(max) = args.max_frames {
        frames = frames.with_max_frames(max);
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Ctrl-C will not stop acquisition early: {e}");
    }

    let mut sink: Box<dyn DiagnosticSink> = match &args.debug_dir {
        Some(dir) => Box::new(DebugFrameWriter::new(dir)?),
        None => Box::new(LogSink),
    };
    let report = pipeline.run(&mut frames, sink.as_mut(), &cancel)?;

    println!("{report}");
    if let Some(path) = &args.output {
        report.write_json(path)?;
    }
    if let Some(limit) = args.max_mean_error {
        let mean = report.reprojection.mean_error;
        if mean > limit {
            return Err(AccuracyError { mean, limit }.into());
        }
    }
    Ok(())
}
