use crate::chessboard::{ChessboardDetector, FrameDetection};
use crate::core::{GrayImage, GrayImageView};

/// Errors produced by the `image` interop helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },

    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidGrayDimensions { width: usize, height: usize },
}

/// Borrow an `image::GrayImage` as the workspace view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Copy an `image::GrayImage` into an owned frame.
pub fn frame_from_image(img: ::image::GrayImage) -> GrayImage {
    GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    }
}

/// Borrow a tightly packed 8-bit buffer as a view, checking its length.
pub fn gray_view_from_slice(
    width: usize,
    height: usize,
    pixels: &[u8],
) -> Result<GrayImageView<'_>, DetectError> {
    let Some(expected) = width.checked_mul(height) else {
        return Err(DetectError::InvalidGrayDimensions { width, height });
    };
    if pixels.len() != expected {
        return Err(DetectError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        });
    }
    Ok(GrayImageView {
        width,
        height,
        data: pixels,
    })
}

/// Convert a frame back to `image` for encoding.
pub fn frame_to_image(frame: &GrayImage) -> Result<::image::GrayImage, DetectError> {
    let view = gray_view_from_slice(frame.width, frame.height, &frame.data)?;
    let invalid = || DetectError::InvalidGrayDimensions {
        width: view.width,
        height: view.height,
    };
    let width = u32::try_from(view.width).map_err(|_| invalid())?;
    let height = u32::try_from(view.height).map_err(|_| invalid())?;
    ::image::GrayImage::from_raw(width, height, view.data.to_vec()).ok_or_else(invalid)
}

/// Run the checkerboard detector directly on an `image::GrayImage`.
pub fn detect_chessboard(img: &::image::GrayImage, detector: &ChessboardDetector) -> FrameDetection {
    detector.detect(&gray_view(img))
}

/// Run the checkerboard detector on a raw row-major 8-bit buffer.
pub fn detect_chessboard_from_gray_u8(
    width: usize,
    height: usize,
    pixels: &[u8],
    detector: &ChessboardDetector,
) -> Result<FrameDetection, DetectError> {
    let view = gray_view_from_slice(width, height, pixels)?;
    Ok(detector.detect(&view))
}
