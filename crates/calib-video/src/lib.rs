//! Camera calibration from a video of a planar checkerboard.
//!
//! This crate provides:
//! - re-exports of the workspace crates (`core`, `chessboard`, `solver`),
//! - [`CalibrationPipeline`], which pulls frames from a [`FrameSource`],
//!   detects the board, accumulates correspondences and solves for the
//!   camera intrinsics and distortion once the stream ends,
//! - (feature `image`) frame sequences read from disk and a sink that dumps
//!   frames without a detected board,
//! - (feature `cli`) the `calib-video` binary.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_video::{
//!     CalibrationConfig, CalibrationPipeline, CancellationToken, ImageSequenceSource, LogSink,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = CalibrationPipeline::new(CalibrationConfig::default())?;
//! let mut frames = ImageSequenceSource::from_dir("frames/")?;
//! let report = pipeline.run(&mut frames, &mut LogSink, &CancellationToken::new())?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_video::core`: pattern, camera model, homography and image types.
//! - `calib_video::chessboard`: checkerboard corner detection in one frame.
//! - `calib_video::solver`: closed-form plus Levenberg–Marquardt calibration
//!   and reprojection validation.
//! - `calib_video::detect` (feature `image`): helpers for `image::GrayImage`.

pub use calib_video_chessboard as chessboard;
pub use calib_video_core as core;
pub use calib_video_solver as solver;

mod accumulator;
mod config;
mod pipeline;
mod report;
mod source;

#[cfg(feature = "image")]
pub mod detect;
#[cfg(feature = "image")]
mod sequence;

pub use accumulator::{AccumulatorError, CorrespondenceAccumulator};
pub use config::{CalibrationConfig, ConfigError, ConfigIoError, PatternConfig};
pub use pipeline::{CalibrationError, CalibrationPipeline, PipelineState};
pub use report::CalibrationReport;
pub use source::{
    CancellationToken, DiagnosticSink, FrameSource, LogSink, NullSink, VecFrameSource,
};

#[cfg(feature = "image")]
pub use sequence::{DebugFrameWriter, ImageSequenceSource};
