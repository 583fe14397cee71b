//! Checkerboard detector built on top of `calib-video-core`.
//!
//! ## Quickstart
//!
//! ```
//! use calib_video_chessboard::{ChessboardDetector, ChessboardParams};
//! use calib_video_core::GrayImage;
//!
//! let detector = ChessboardDetector::new(8, 6, ChessboardParams::default()).unwrap();
//! let frame = GrayImage::filled(320, 240, 0);
//! let result = detector.detect(&frame.view());
//! println!("detected: {}", result.found());
//! ```
//!
//! Algorithm (graph-based, perspective-aware):
//! 1. Stretch the frame contrast.
//! 2. Compute the ChESS X-junction response, keep strong local maxima with
//!    their light-diagonal orientation.
//! 3. For each corner, find up to 4 neighbors among its k nearest (kd-tree)
//!    whose orientation is swapped and whose edge runs at ~45° to both
//!    diagonals. Keep mutual links only.
//! 4. Take the connected component with exactly `rows * cols` corners and
//!    BFS it, classifying every step against a locally propagated lattice
//!    basis. Any inconsistency rejects the frame.
//! 5. Check the grid shape and its planar homography residual, then pick the
//!    canonical labelling (right-handed, first corner nearest the image origin).
//! 6. Refine each corner with gradient-orthogonality iterations.

mod detector;
mod geom;
mod grid;
mod gridgraph;
mod params;
mod response;
mod result;
mod subpix;

pub use detector::{ChessboardDetector, ChessboardError};
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams, RefineParams, ResponseParams};
pub use response::{chess_response, find_corners, Corner, ResponseMap};
pub use result::{DetectionMiss, FrameDetection};
pub use subpix::{refine_corner, refine_corners};
