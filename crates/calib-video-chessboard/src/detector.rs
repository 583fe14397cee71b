use crate::grid::{canonical_order, label_component, planarity};
use crate::gridgraph::{connected_components, GridGraph};
use crate::params::ChessboardParams;
use crate::response::find_corners;
use crate::result::{DetectionMiss, FrameDetection};
use crate::subpix::refine_corners;
use calib_video_core::GrayImageView;
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessboardError {
    #[error("board needs at least 2x2 inner corners (got rows={rows}, cols={cols})")]
    InvalidGrid { rows: usize, cols: usize },
    #[error("refinement window must be odd and at least 3 (got {0})")]
    InvalidWindow(usize),
}

/// Finds the `rows x cols` inner corners of a checkerboard in a grayscale frame.
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    rows: usize,
    cols: usize,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(
        rows: usize,
        cols: usize,
        params: ChessboardParams,
    ) -> Result<Self, ChessboardError> {
        if rows < 2 || cols < 2 {
            return Err(ChessboardError::InvalidGrid { rows, cols });
        }
        let window = params.refine.window_size;
        if window < 3 || window % 2 == 0 {
            return Err(ChessboardError::InvalidWindow(window));
        }
        Ok(Self { rows, cols, params })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Detect the board and refine its corners to sub-pixel precision.
    ///
    /// On success the corners are ordered `r * cols + c`, matching
    /// `PatternModel::points`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn detect(&self, img: &GrayImageView<'_>) -> FrameDetection {
        let image_size = img.size();
        match self.locate(img) {
            Ok(coarse) => {
                let corners = refine_corners(img, &coarse, &self.params.refine);
                FrameDetection::Found {
                    image_size,
                    corners,
                }
            }
            Err(reason) => {
                debug!("no board: {reason}");
                FrameDetection::NotFound { image_size, reason }
            }
        }
    }

    /// Pixel-accurate corners in canonical order.
    fn locate(&self, img: &GrayImageView<'_>) -> Result<Vec<Point2<f64>>, DetectionMiss> {
        let required = self.rows * self.cols;

        let normalized = self.params.normalize_image.then(|| img.normalized());
        let view = normalized.as_ref().map_or(*img, |n| n.view());

        let corners = find_corners(&view, &self.params.response);
        debug!("{} X-junction candidates", corners.len());
        if corners.len() < required {
            return Err(DetectionMiss::TooFewCorners {
                found: corners.len(),
                required,
            });
        }

        let graph_params = self.params.graph.for_image(view.width, view.height);
        let graph = GridGraph::new(&corners, &graph_params);
        let components = connected_components(&graph);
        let largest = components.iter().map(Vec::len).max().unwrap_or(0);
        let Some(component) = components.iter().find(|c| c.len() == required) else {
            return Err(DetectionMiss::NoGrid { largest, required });
        };

        let grid = label_component(&corners, &graph, component, self.params.min_axis_alignment)?;
        let order = canonical_order(&grid, &corners, self.rows, self.cols)?;
        let points: Vec<Point2<f64>> = order
            .iter()
            .map(|&k| {
                let p = corners[k].position;
                Point2::new(f64::from(p.x), f64::from(p.y))
            })
            .collect();

        let (residual, median) =
            planarity(&points, self.rows, self.cols).ok_or(DetectionMiss::LabelConflict)?;
        let limit = self.params.max_homography_residual_rel * median;
        if residual > limit {
            return Err(DetectionMiss::NotPlanar { residual, limit });
        }

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_boards_and_even_windows() {
        assert_eq!(
            ChessboardDetector::new(1, 6, ChessboardParams::default()).err(),
            Some(ChessboardError::InvalidGrid { rows: 1, cols: 6 })
        );
        let mut params = ChessboardParams::default();
        params.refine.window_size = 10;
        assert_eq!(
            ChessboardDetector::new(8, 6, params).err(),
            Some(ChessboardError::InvalidWindow(10))
        );
    }

    #[test]
    fn blank_frame_is_not_found() {
        let img = calib_video_core::GrayImage::filled(320, 240, 0);
        let det = ChessboardDetector::new(8, 6, ChessboardParams::default()).expect("detector");
        let res = det.detect(&img.view());
        assert!(!res.found());
        assert_eq!(res.image_size(), (320, 240));
        assert!(res.corners().is_none());
    }
}
