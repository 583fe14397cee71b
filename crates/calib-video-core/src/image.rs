/// Borrowed 8-bit grayscale buffer, row-major, `data.len() == width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned 8-bit grayscale frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a constant intensity.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap a raw buffer; `None` when the length does not match `width * height`.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// `(width, height)` in pixels.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl<'a> GrayImageView<'a> {
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel value with coordinates clamped to the border.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        let xc = x.clamp(0, self.width as i64 - 1) as usize;
        let yc = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[yc * self.width + xc]
    }

    /// Min-max contrast stretch to the full `[0, 255]` range.
    ///
    /// A flat image stays flat (all zeros) so later stages see no structure.
    pub fn normalized(&self) -> GrayImage {
        let (lo, hi) = self
            .data
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if self.data.is_empty() || hi <= lo {
            return GrayImage::filled(self.width, self.height, 0);
        }
        let scale = 255.0 / f32::from(hi - lo);
        let data = self
            .data
            .iter()
            .map(|&v| (f32::from(v - lo) * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Bilinear sample at `(x, y)` with pixel centers at integer coordinates.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (xi, yi) = (x0 as i64, y0 as i64);

    let p00 = f32::from(src.get_clamped(xi, yi));
    let p10 = f32::from(src.get_clamped(xi + 1, yi));
    let p01 = f32::from(src.get_clamped(xi, yi + 1));
    let p11 = f32::from(src.get_clamped(xi + 1, yi + 1));

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(GrayImage::from_raw(4, 3, vec![0; 11]).is_none());
        assert!(GrayImage::from_raw(4, 3, vec![0; 12]).is_some());
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage::from_raw(2, 1, vec![0, 100]).expect("buffer");
        let v = img.view();
        assert!((sample_bilinear(&v, 0.5, 0.0) - 50.0).abs() < 1e-4);
        // Outside the image the border pixel is replicated.
        assert!((sample_bilinear(&v, 3.0, 0.0) - 100.0).abs() < 1e-4);
        assert!((sample_bilinear(&v, -2.0, 0.0)).abs() < 1e-4);
    }

    #[test]
    fn normalization_stretches_and_keeps_flat_images_flat() {
        let img = GrayImage::from_raw(3, 1, vec![50, 100, 150]).expect("buffer");
        let n = img.view().normalized();
        assert_eq!(n.data, vec![0, 128, 255]);

        let flat = GrayImage::filled(5, 5, 77);
        assert!(flat.view().normalized().data.iter().all(|&v| v == 0));
    }
}
