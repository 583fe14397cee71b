use approx::assert_relative_eq;
use calib_video::chessboard::DetectionMiss;
use calib_video::core::synthetic::{calibration_poses, render, RenderParams};
use calib_video::core::{GrayImage, IntrinsicModel, PatternModel, DISTORTION_LEN};
use calib_video::{
    CalibrationConfig, CalibrationError, CalibrationPipeline, CalibrationReport,
    CancellationToken, DiagnosticSink, FrameSource, NullSink, PipelineState, VecFrameSource,
};

fn camera() -> IntrinsicModel {
    IntrinsicModel::pinhole(600.0, 600.0, 319.5, 239.5).with_distortion([-0.05, 0.01, 0.0, 0.0, 0.0])
}

/// `boards` rendered views of the default 8x6 pattern.
fn board_frames(boards: usize) -> Vec<GrayImage> {
    let cam = camera();
    let pattern = PatternModel::new(8, 6, 25.0).expect("pattern");
    calibration_poses(&pattern, 500.0)
        .iter()
        .take(boards)
        .map(|pose| render(&cam, pose, &pattern, &RenderParams::default()))
        .collect()
}

fn blank() -> GrayImage {
    GrayImage::filled(640, 480, 128)
}

#[derive(Default)]
struct Recorder {
    states: Vec<PipelineState>,
    failed: Vec<usize>,
    reported: Option<CalibrationReport>,
}

impl DiagnosticSink for Recorder {
    fn detection_failed(&mut self, frame_index: usize, _: &GrayImage, _: &DetectionMiss) {
        self.failed.push(frame_index);
    }

    fn state_changed(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    fn report(&mut self, report: &CalibrationReport) {
        self.reported = Some(report.clone());
    }
}

#[test]
fn five_boards_and_a_blank_frame_calibrate() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut frames = board_frames(5);
    frames.insert(2, blank());
    let mut source = VecFrameSource::new(frames);
    let mut sink = Recorder::default();

    let pipeline = CalibrationPipeline::new(CalibrationConfig::default()).expect("pipeline");
    let report = pipeline
        .run(&mut source, &mut sink, &CancellationToken::new())
        .expect("calibration");

    assert_eq!(report.frames_seen, 6);
    assert_eq!(report.frames_detected, 5);
    assert_eq!(report.samples_used, 5);
    assert_eq!(report.image_size, (640, 480));
    assert_eq!(report.poses.len(), 5);
    assert_eq!(report.reprojection.per_frame.len(), 5);
    assert_eq!(report.distortion.len(), DISTORTION_LEN);
    assert!(report.intrinsics.is_valid());
    assert!(report.reprojection.mean_error < 2.0, "{report}");
    assert_relative_eq!(report.intrinsics.fx, 600.0, max_relative = 0.01);
    assert_relative_eq!(report.intrinsics.fy, 600.0, max_relative = 0.01);

    assert_eq!(sink.failed, vec![2]);
    assert_eq!(
        sink.states,
        vec![
            PipelineState::Collecting,
            PipelineState::Solving,
            PipelineState::Validating,
            PipelineState::Reported,
        ]
    );
    assert_eq!(sink.reported.as_ref(), Some(&report));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");
    report.write_json(&path).expect("write report");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(json["distortion"].as_array().map(Vec::len), Some(5));
    assert_eq!(json["samples_used"], 5);
}

#[test]
fn blank_frames_never_reach_the_solver() {
    let mut source = VecFrameSource::new((0..3).map(|_| blank()));
    let mut sink = Recorder::default();
    let pipeline = CalibrationPipeline::new(CalibrationConfig::default()).expect("pipeline");

    let err = pipeline
        .run(&mut source, &mut sink, &CancellationToken::new())
        .expect_err("no boards");
    assert!(matches!(
        err,
        CalibrationError::InsufficientSamples {
            found: 0,
            required: 5
        }
    ));
    assert!(!sink.states.contains(&PipelineState::Solving));
    assert!(sink.reported.is_none());
}

#[test]
fn solve_uses_only_the_earliest_samples_up_to_the_cap() {
    let config = CalibrationConfig {
        min_samples: 3,
        max_samples: 4,
        ..CalibrationConfig::default()
    };
    let pipeline = CalibrationPipeline::new(config).expect("pipeline");
    let mut source = VecFrameSource::new(board_frames(6));

    let report = pipeline
        .run(&mut source, &mut NullSink, &CancellationToken::new())
        .expect("calibration");
    assert_eq!(report.frames_detected, 6);
    assert_eq!(report.samples_used, 4);
    assert_eq!(report.poses.len(), 4);
    assert_eq!(report.reprojection.per_frame.len(), 4);
}

/// Cancels the shared token once it has handed out `budget` frames.
struct CancelAfter {
    inner: VecFrameSource,
    budget: usize,
    pulled: usize,
    cancel: CancellationToken,
}

impl FrameSource for CancelAfter {
    fn next_frame(&mut self) -> Option<GrayImage> {
        self.pulled += 1;
        if self.pulled >= self.budget {
            self.cancel.cancel();
        }
        self.inner.next_frame()
    }
}

#[test]
fn cancellation_ends_acquisition_like_end_of_stream() {
    let cancel = CancellationToken::new();
    let mut source = CancelAfter {
        inner: VecFrameSource::new(board_frames(3)),
        budget: 2,
        pulled: 0,
        cancel: cancel.clone(),
    };
    let pipeline = CalibrationPipeline::new(CalibrationConfig::default()).expect("pipeline");
    let mut sink = Recorder::default();

    let err = pipeline
        .run(&mut source, &mut sink, &cancel)
        .expect_err("too few frames before cancel");
    assert!(matches!(
        err,
        CalibrationError::InsufficientSamples {
            found: 2,
            required: 5
        }
    ));
    assert_eq!(source.pulled, 2);
    assert_eq!(source.inner.remaining(), 1);
    assert_eq!(sink.states.last(), Some(&PipelineState::Aborted));
}

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");

    let mut config = CalibrationConfig::default();
    config.pattern.rows = 9;
    config.detector.refine.window_size = 7;
    config.write_json(&path).expect("write");

    let loaded = CalibrationConfig::load_json(&path).expect("load");
    assert_eq!(loaded, config);
    loaded.validate().expect("valid");

    std::fs::write(&path, "{ not json").expect("write");
    assert!(matches!(
        CalibrationConfig::load_json(&path),
        Err(calib_video::ConfigIoError::Json { .. })
    ));
    assert!(matches!(
        CalibrationConfig::load_json(dir.path().join("missing.json")),
        Err(calib_video::ConfigIoError::Io { .. })
    ));
}
