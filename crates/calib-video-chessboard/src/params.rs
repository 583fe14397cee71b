use serde::{Deserialize, Serialize};

/// X-junction response and non-maximum suppression.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseParams {
    /// Keep peaks above `threshold_rel * max_response`.
    pub threshold_rel: f32,
    /// Half-size of the suppression window, in pixels.
    pub nms_radius: usize,
}

impl Default for ResponseParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    /// Neighbor distance limit as a fraction of the shorter image side.
    /// The larger of this and `max_spacing_pix` applies.
    pub max_spacing_rel: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 6.0,
            max_spacing_pix: 150.0,
            max_spacing_rel: 0.25,
            k_neighbors: 9,
            orientation_tolerance_deg: 22.5,
        }
    }
}

impl GridGraphParams {
    /// Limits for a `width x height` frame, with the relative bound resolved.
    pub fn for_image(&self, width: usize, height: usize) -> Self {
        let short_side = width.min(height) as f32;
        Self {
            max_spacing_pix: self.max_spacing_pix.max(self.max_spacing_rel * short_side),
            ..self.clone()
        }
    }
}

/// Iterative gradient-orthogonality corner refinement.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefineParams {
    /// Full side of the square search window, odd.
    pub window_size: usize,
    /// Stop once an iteration moves the corner less than this, in pixels.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            window_size: 11,
            tolerance: 0.1,
            max_iterations: 30,
        }
    }
}

/// Parameters of the checkerboard detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Stretch the frame to the full intensity range before detection.
    pub normalize_image: bool,
    pub response: ResponseParams,
    pub graph: GridGraphParams,
    /// Cosine between a grid step and the local lattice axis it is assigned to.
    pub min_axis_alignment: f32,
    /// Reject grids whose planar fit residual exceeds this fraction of the
    /// median corner spacing.
    pub max_homography_residual_rel: f64,
    pub refine: RefineParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            normalize_image: true,
            response: ResponseParams::default(),
            graph: GridGraphParams::default(),
            min_axis_alignment: 0.8,
            max_homography_residual_rel: 0.35,
            refine: RefineParams::default(),
        }
    }
}
