//! Acquisition, solve and validation wired into one run.

use crate::accumulator::{AccumulatorError, CorrespondenceAccumulator};
use crate::chessboard::{ChessboardDetector, FrameDetection};
use crate::config::{CalibrationConfig, ConfigError};
use crate::core::PatternModel;
use crate::report::CalibrationReport;
use crate::solver::{calibrate, validate, SolveError, ValidationError};
use crate::source::{CancellationToken, DiagnosticSink, FrameSource};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Stage of a calibration run.
///
/// `Collecting` leads to `Aborted` when too few boards were found, or to
/// `Solving`; `Solving` and `Validating` end in `Failed` or `Reported`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Collecting,
    Solving,
    Validating,
    Reported,
    Aborted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reported | Self::Aborted | Self::Failed)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("board found in {found} frames, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
    #[error("calibration failed: {0}")]
    Solve(#[from] SolveError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Counters gathered while pulling frames.
#[derive(Debug, Default)]
struct Acquisition {
    accumulator: CorrespondenceAccumulator,
    frames_seen: usize,
    /// Size of the most recent frame with a detected board.
    image_size: Option<(usize, usize)>,
}

/// Drives frames through detection into a solved and validated camera model.
#[derive(Clone, Debug)]
pub struct CalibrationPipeline {
    config: CalibrationConfig,
    pattern: PatternModel,
    detector: ChessboardDetector,
}

impl CalibrationPipeline {
    /// Validate `config` and build the pattern and detector it describes.
    pub fn new(config: CalibrationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pattern = config.pattern_model()?;
        let detector = config.detector()?;
        Ok(Self {
            config,
            pattern,
            detector,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn pattern(&self) -> &PatternModel {
        &self.pattern
    }

    /// Pull frames until the source ends or `cancel` fires, then solve and validate.
    ///
    /// Frames without a board are reported to `sink` and skipped. The minimum
    /// sample check uses every detected frame; the solve and the validation
    /// both use only the first `max_samples` of them.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run<S, D>(
        &self,
        source: &mut S,
        sink: &mut D,
        cancel: &CancellationToken,
    ) -> Result<CalibrationReport, CalibrationError>
    where
        S: FrameSource + ?Sized,
        D: DiagnosticSink + ?Sized,
    {
        sink.state_changed(PipelineState::Collecting);
        let acq = match self.collect(source, sink, cancel) {
            Ok(acq) => acq,
            Err(e) => {
                sink.state_changed(PipelineState::Failed);
                return Err(e);
            }
        };

        let found = acq.accumulator.len();
        let required = self.config.min_samples;
        let image_size = match acq.image_size {
            Some(size) if acq.accumulator.is_ready(required) => size,
            _ => {
                info!("board found in {found} of {} frames, need {required}", acq.frames_seen);
                sink.state_changed(PipelineState::Aborted);
                return Err(CalibrationError::InsufficientSamples { found, required });
            }
        };

        let result = self.solve(&acq, image_size, sink);
        match &result {
            Ok(report) => {
                sink.state_changed(PipelineState::Reported);
                sink.report(report);
            }
            Err(e) => {
                warn!("{e}");
                sink.state_changed(PipelineState::Failed);
            }
        }
        result
    }

    fn collect<S, D>(
        &self,
        source: &mut S,
        sink: &mut D,
        cancel: &CancellationToken,
    ) -> Result<Acquisition, CalibrationError>
    where
        S: FrameSource + ?Sized,
        D: DiagnosticSink + ?Sized,
    {
        let mut acq = Acquisition::default();
        loop {
            if cancel.is_cancelled() {
                info!("acquisition cancelled after {} frames", acq.frames_seen);
                break;
            }
            let Some(frame) = source.next_frame() else {
                break;
            };
            let index = acq.frames_seen;
            acq.frames_seen += 1;

            match self.detector.detect(&frame.view()) {
                FrameDetection::Found {
                    image_size,
                    corners,
                } => {
                    acq.accumulator
                        .record(self.pattern.points().to_vec(), corners)?;
                    acq.image_size = Some(image_size);
                    debug!(
                        "frame {index}: board detected ({} samples)",
                        acq.accumulator.len()
                    );
                }
                FrameDetection::NotFound { reason, .. } => {
                    sink.detection_failed(index, &frame, &reason);
                }
            }
        }
        Ok(acq)
    }

    fn solve<D>(
        &self,
        acq: &Acquisition,
        image_size: (usize, usize),
        sink: &mut D,
    ) -> Result<CalibrationReport, CalibrationError>
    where
        D: DiagnosticSink + ?Sized,
    {
        let views = acq.accumulator.snapshot(self.config.max_samples);
        if views.len() < acq.accumulator.len() {
            info!(
                "solving the first {} of {} detected frames",
                views.len(),
                acq.accumulator.len()
            );
        }

        sink.state_changed(PipelineState::Solving);
        let started = Instant::now();
        let solution = calibrate(views, image_size, &self.config.solver)?;
        let solve_seconds = started.elapsed().as_secs_f64();

        sink.state_changed(PipelineState::Validating);
        let reprojection = validate(&solution.intrinsics, &solution.poses, views)?;
        info!(
            "mean reprojection error {:.4}px over {} frames",
            reprojection.mean_error,
            views.len()
        );

        let k = solution.intrinsics.k_matrix();
        Ok(CalibrationReport {
            intrinsics: solution.intrinsics,
            camera_matrix: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion: solution.intrinsics.distortion,
            poses: solution.poses,
            reprojection,
            image_size,
            frames_seen: acq.frames_seen,
            frames_detected: acq.accumulator.len(),
            samples_used: views.len(),
            solve: solution.stats,
            solve_seconds,
        })
    }
}
