//! Frame sequences on disk: decoding extracted video frames and dumping misses.

use crate::chessboard::DetectionMiss;
use crate::core::GrayImage;
use crate::detect::{frame_from_image, frame_to_image};
use crate::pipeline::PipelineState;
use crate::report::CalibrationReport;
use crate::source::{DiagnosticSink, FrameSource, LogSink};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm", "ppm"];

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Image files of a directory, decoded to 8-bit luma in lexical file-name order.
///
/// Files that fail to decode are logged and skipped.
#[derive(Clone, Debug)]
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
}

impl ImageSequenceSource {
    pub fn from_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self::from_paths(paths))
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Keep only the first `max_frames` files.
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.paths.truncate(max_frames);
        self
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<GrayImage> {
        while let Some(path) = self.paths.pop_front() {
            match ::image::open(&path) {
                Ok(img) => {
                    debug!("decoded {}", path.display());
                    return Some(frame_from_image(img.to_luma8()));
                }
                Err(e) => warn!("skipping {}: {e}", path.display()),
            }
        }
        None
    }
}

/// Writes every frame without a detected board to `fail_frame_{index}.png`.
///
/// Other diagnostics are forwarded to [`LogSink`].
#[derive(Clone, Debug)]
pub struct DebugFrameWriter {
    dir: PathBuf,
    written: usize,
}

impl DebugFrameWriter {
    /// Create `dir` if needed and write into it.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn frame_path(&self, frame_index: usize) -> PathBuf {
        self.dir.join(format!("fail_frame_{frame_index}.png"))
    }

    /// Number of frames written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl DiagnosticSink for DebugFrameWriter {
    fn detection_failed(&mut self, frame_index: usize, frame: &GrayImage, reason: &DetectionMiss) {
        LogSink.detection_failed(frame_index, frame, reason);
        let path = self.frame_path(frame_index);
        let saved = frame_to_image(frame)
            .map_err(|e| e.to_string())
            .and_then(|img| img.save(&path).map_err(|e| e.to_string()));
        match saved {
            Ok(()) => self.written += 1,
            Err(e) => warn!("cannot write {}: {e}", path.display()),
        }
    }

    fn state_changed(&mut self, state: PipelineState) {
        LogSink.state_changed(state);
    }

    fn report(&mut self, report: &CalibrationReport) {
        LogSink.report(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_frames_in_lexical_order_and_skips_junk() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, value) in [("frame_002.png", 2u8), ("frame_000.png", 0), ("frame_001.png", 1)] {
            ::image::GrayImage::from_pixel(4, 3, ::image::Luma([value]))
                .save(dir.path().join(name))
                .expect("save");
        }
        fs::write(dir.path().join("notes.txt"), "not a frame").expect("write");
        fs::write(dir.path().join("frame_003.png"), b"broken").expect("write");

        let mut src = ImageSequenceSource::from_dir(dir.path()).expect("list");
        assert_eq!(src.remaining(), 4);
        for v in 0..3u8 {
            let frame = src.next_frame().expect("frame");
            assert_eq!(frame.size(), (4, 3));
            assert_eq!(frame.data[0], v);
        }
        assert!(src.next_frame().is_none());
    }

    #[test]
    fn max_frames_truncates() {
        let src = ImageSequenceSource::from_paths((0..5).map(|k| PathBuf::from(format!("{k}.png"))))
            .with_max_frames(2);
        assert_eq!(src.remaining(), 2);
    }

    #[test]
    fn writes_failed_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = DebugFrameWriter::new(dir.path().join("debug")).expect("writer");
        let frame = GrayImage::filled(6, 4, 77);
        let reason = DetectionMiss::TooFewCorners {
            found: 0,
            required: 48,
        };
        sink.detection_failed(3, &frame, &reason);

        assert_eq!(sink.written(), 1);
        let saved = ::image::open(sink.frame_path(3)).expect("open").to_luma8();
        assert_eq!(saved.dimensions(), (6, 4));
        assert_eq!(saved.get_pixel(0, 0).0[0], 77);
    }
}
