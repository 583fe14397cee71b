use nalgebra::Point2;
use serde::Serialize;

/// Why a frame did not yield a complete board.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize)]
pub enum DetectionMiss {
    #[error("{found} corner candidates, need {required}")]
    TooFewCorners { found: usize, required: usize },
    #[error("largest connected grid has {largest} corners, need {required}")]
    NoGrid { largest: usize, required: usize },
    #[error("inconsistent grid labelling")]
    LabelConflict,
    #[error("grid is {width}x{height}")]
    WrongSize { width: usize, height: usize },
    #[error("planar fit residual {residual:.2}px exceeds {limit:.2}px")]
    NotPlanar { residual: f64, limit: f64 },
}

/// Outcome of running the detector on one frame.
///
/// A miss is an expected outcome rather than an error; callers skip the frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FrameDetection {
    Found {
        image_size: (usize, usize),
        /// `rows * cols` refined corners, index `r * cols + c`.
        corners: Vec<Point2<f64>>,
    },
    NotFound {
        image_size: (usize, usize),
        reason: DetectionMiss,
    },
}

impl FrameDetection {
    #[inline]
    pub fn found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// `(width, height)` of the frame the detector ran on.
    #[inline]
    pub fn image_size(&self) -> (usize, usize) {
        match self {
            Self::Found { image_size, .. } | Self::NotFound { image_size, .. } => *image_size,
        }
    }

    pub fn corners(&self) -> Option<&[Point2<f64>]> {
        match self {
            Self::Found { corners, .. } => Some(corners),
            Self::NotFound { .. } => None,
        }
    }

    pub fn into_corners(self) -> Option<Vec<Point2<f64>>> {
        match self {
            Self::Found { corners, .. } => Some(corners),
            Self::NotFound { .. } => None,
        }
    }

    pub fn miss_reason(&self) -> Option<&DetectionMiss> {
        match self {
            Self::Found { .. } => None,
            Self::NotFound { reason, .. } => Some(reason),
        }
    }
}
