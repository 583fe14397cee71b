//! Intrinsic calibration from planar-target correspondences.
//!
//! [`calibrate`] estimates focal lengths, principal point and the five
//! Brown–Conrady coefficients shared by all views, plus one pose per view:
//! 1. a normalized DLT homography per view,
//! 2. closed-form focal lengths with the principal point at the image center,
//! 3. poses from decomposing each homography with that camera matrix,
//! 4. Levenberg–Marquardt over every parameter at once.
//!
//! [`validate`] reprojects the pattern with the solved model and reports the
//! per-view and mean pixel error.

mod error;
mod init;
mod params;
mod refine;
mod solve;
mod validate;

pub use error::{SolveError, ValidationError};
pub use init::{initial_intrinsics, pose_from_homography, view_homographies};
pub use params::SolverParams;
pub use refine::{refine, SolveStats};
pub use solve::{calibrate, CalibrationSolution, MIN_VIEWS};
pub use validate::{validate, ReprojectionReport};
