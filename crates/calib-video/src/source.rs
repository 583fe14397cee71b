//! Pipeline collaborators: where frames come from and where diagnostics go.

use crate::chessboard::DetectionMiss;
use crate::core::GrayImage;
use crate::pipeline::PipelineState;
use crate::report::CalibrationReport;
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pull-based stream of grayscale frames.
pub trait FrameSource {
    /// The next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<GrayImage>;
}

/// Frames held in memory, yielded front to back.
#[derive(Clone, Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<GrayImage>,
}

impl VecFrameSource {
    pub fn new(frames: impl IntoIterator<Item = GrayImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Option<GrayImage> {
        self.frames.pop_front()
    }
}

/// Cooperative stop flag shared between the pipeline and whoever may stop it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer of a pipeline run. Every method defaults to doing nothing.
pub trait DiagnosticSink {
    /// A pulled frame produced no complete board.
    fn detection_failed(
        &mut self,
        _frame_index: usize,
        _frame: &GrayImage,
        _reason: &DetectionMiss,
    ) {
    }

    fn state_changed(&mut self, _state: PipelineState) {}

    fn report(&mut self, _report: &CalibrationReport) {}
}

/// Discards every diagnostic.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {}

/// Forwards diagnostics to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn detection_failed(&mut self, frame_index: usize, _frame: &GrayImage, reason: &DetectionMiss) {
        warn!("frame {frame_index}: no board ({reason})");
    }

    fn state_changed(&mut self, state: PipelineState) {
        info!("pipeline state: {state:?}");
    }

    fn report(&mut self, report: &CalibrationReport) {
        info!(
            "calibrated from {} frames: mean reprojection error {:.4}px",
            report.samples_used, report.reprojection.mean_error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_yields_in_order_then_ends() {
        let mut src = VecFrameSource::new((0..3u8).map(|v| GrayImage::filled(2, 2, v)));
        assert_eq!(src.remaining(), 3);
        for v in 0..3u8 {
            assert_eq!(src.next_frame().map(|f| f.data[0]), Some(v));
        }
        assert!(src.next_frame().is_none());
        assert!(src.next_frame().is_none());
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }
}
