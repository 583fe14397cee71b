//! Core types for video-based camera calibration.
//!
//! This crate is purely geometric and has no notion of frames arriving over
//! time. It provides:
//! - the planar [`PatternModel`] and its canonical point ordering,
//! - a pinhole [`IntrinsicModel`] with Brown–Conrady distortion and [`PoseEstimate`],
//! - a lightweight grayscale image type with bilinear sampling,
//! - normalized DLT homography estimation,
//! - a synthetic checkerboard renderer used by tests and demos,
//! - a tiny stderr logger (and an optional `tracing` subscriber).

mod camera;
mod homography;
mod image;
mod logger;
mod pattern;
pub mod synthetic;

pub use camera::{rodrigues, IntrinsicModel, PoseEstimate, DISTORTION_LEN};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView};
pub use pattern::{Correspondence, PatternError, PatternModel};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
