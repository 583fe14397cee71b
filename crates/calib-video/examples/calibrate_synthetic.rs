//! Render a synthetic checkerboard "video", calibrate from it and compare
//! against the camera that rendered it.
//!
//! `cargo run --example calibrate_synthetic -- [frames_dir]` additionally saves
//! the frames as PNGs so the `calib-video` binary can be tried on them.

use std::{env, fs, path::PathBuf};

use calib_video::core::synthetic::{calibration_poses, render, RenderParams};
use calib_video::core::{GrayImage, IntrinsicModel, PatternModel};
use calib_video::detect::frame_to_image;
use calib_video::{
    CalibrationConfig, CalibrationPipeline, CancellationToken, LogSink, VecFrameSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    calib_video::core::init_with_level(log::LevelFilter::Info)?;

    let truth = IntrinsicModel::pinhole(620.0, 615.0, 324.0, 236.0)
        .with_distortion([-0.08, 0.02, 0.0005, -0.0005, 0.0]);
    let config = CalibrationConfig::default();
    let pattern = PatternModel::new(
        config.pattern.rows,
        config.pattern.cols,
        config.pattern.spacing,
    )?;

    let mut frames: Vec<GrayImage> = calibration_poses(&pattern, 500.0)
        .iter()
        .map(|pose| render(&truth, pose, &pattern, &RenderParams::default()))
        .collect();
    // A frame where the board left the field of view.
    frames.insert(3, GrayImage::filled(640, 480, 128));

    if let Some(dir) = env::args().nth(1).map(PathBuf::from) {
        fs::create_dir_all(&dir)?;
        for (k, frame) in frames.iter().enumerate() {
            frame_to_image(frame)?.save(dir.join(format!("frame_{k:03}.png")))?;
        }
        println!("wrote {} frames to {}", frames.len(), dir.display());
    }

    let pipeline = CalibrationPipeline::new(config)?;
    let mut source = VecFrameSource::new(frames);
    let report = pipeline.run(&mut source, &mut LogSink, &CancellationToken::new())?;

    println!("{report}");
    let k = &report.intrinsics;
    println!(
        "truth:  fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        truth.fx, truth.fy, truth.cx, truth.cy
    );
    println!(
        "solved: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        k.fx, k.fy, k.cx, k.cy
    );
    Ok(())
}
