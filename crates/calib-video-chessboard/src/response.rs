//! ChESS X-junction response and coarse corner extraction.
//!
//! For each pixel a ring of 16 samples at radius 5 is compared:
//! `R = SR - DR - 16 * MR`, where `SR` rewards quadrature symmetry (dark and
//! light quadrants alternating), `DR` penalizes edges (opposite samples that
//! differ) and `MR` penalizes a center that disagrees with the ring mean.
//! Only X-junctions give a strongly positive response.

use crate::params::ResponseParams;
use calib_video_core::GrayImageView;
use nalgebra::Point2;

/// Ring of 16 samples at radius 5, clockwise from the top.
const RING: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (3, -3),
    (5, -2),
    (5, 0),
    (5, 2),
    (3, 3),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-3, 3),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-3, -3),
    (-2, -5),
];

const RING_RADIUS: usize = 5;

/// Coarse X-junction candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Direction of the light diagonal, modulo π.
    pub orientation: f32,
    pub strength: f32,
}

/// Dense response map, row-major, zero near the border.
#[derive(Clone, Debug)]
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

#[inline]
fn ring_samples(img: &GrayImageView<'_>, x: usize, y: usize) -> [f32; 16] {
    let mut s = [0.0f32; 16];
    for (k, (dx, dy)) in RING.iter().enumerate() {
        let px = (x as i32 + dx) as usize;
        let py = (y as i32 + dy) as usize;
        s[k] = f32::from(img.data[py * img.width + px]);
    }
    s
}

/// Compute the ChESS response of every pixel at least the ring radius from the border.
pub fn chess_response(img: &GrayImageView<'_>) -> ResponseMap {
    let (w, h) = img.size();
    let mut data = vec![0.0f32; w * h];
    if w <= 2 * RING_RADIUS || h <= 2 * RING_RADIUS {
        return ResponseMap {
            width: w,
            height: h,
            data,
        };
    }

    for y in RING_RADIUS..h - RING_RADIUS {
        for x in RING_RADIUS..w - RING_RADIUS {
            let s = ring_samples(img, x, y);

            let mut sr = 0.0;
            for n in 0..4 {
                sr += (s[n] + s[n + 8] - s[n + 4] - s[n + 12]).abs();
            }
            let mut dr = 0.0;
            for n in 0..8 {
                dr += (s[n] - s[n + 8]).abs();
            }
            let ring_mean = s.iter().sum::<f32>() / 16.0;
            let at = |xx: usize, yy: usize| f32::from(img.data[yy * w + xx]);
            let local_mean =
                (at(x, y) + at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1)) / 5.0;
            let mr = (local_mean - ring_mean).abs();

            data[y * w + x] = sr - dr - 16.0 * mr;
        }
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

/// Orientation of the light diagonal from the second harmonic of the ring.
fn ring_orientation(img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
    let s = ring_samples(img, x, y);
    let (mut c, mut si) = (0.0f32, 0.0f32);
    for (k, (dx, dy)) in RING.iter().enumerate() {
        let phi = (*dy as f32).atan2(*dx as f32);
        c += s[k] * (2.0 * phi).cos();
        si += s[k] * (2.0 * phi).sin();
    }
    0.5 * si.atan2(c)
}

/// Non-maximum suppression over the response map.
///
/// Ties inside a window are broken towards the first pixel in raster order so
/// plateaus yield a single corner.
pub fn find_corners(img: &GrayImageView<'_>, params: &ResponseParams) -> Vec<Corner> {
    let resp = chess_response(img);
    let max = resp.data.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = params.threshold_rel.max(0.0) * max;
    let r = params.nms_radius.max(1);
    let (w, h) = (resp.width, resp.height);

    let mut corners = Vec::new();
    for y in RING_RADIUS..h.saturating_sub(RING_RADIUS) {
        for x in RING_RADIUS..w.saturating_sub(RING_RADIUS) {
            let v = resp.at(x, y);
            if v <= 0.0 || v < threshold {
                continue;
            }
            let y0 = y.saturating_sub(r);
            let y1 = (y + r).min(h - 1);
            let x0 = x.saturating_sub(r);
            let x1 = (x + r).min(w - 1);
            let mut is_max = true;
            'win: for yy in y0..=y1 {
                for xx in x0..=x1 {
                    let u = resp.at(xx, yy);
                    let earlier = (yy, xx) < (y, x);
                    if u > v || (u == v && earlier) {
                        is_max = false;
                        break 'win;
                    }
                }
            }
            if is_max {
                corners.push(Corner {
                    position: Point2::new(x as f32, y as f32),
                    orientation: ring_orientation(img, x, y),
                    strength: v,
                });
            }
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_video_core::GrayImage;

    /// Four quadrants meeting at `(cx, cy)`, light along the main diagonal.
    fn x_junction(size: usize, cx: usize, cy: usize) -> GrayImage {
        let mut img = GrayImage::filled(size, size, 0);
        for y in 0..size {
            for x in 0..size {
                let light = (x >= cx) == (y >= cy);
                img.data[y * size + x] = if light { 220 } else { 30 };
            }
        }
        img
    }

    #[test]
    fn x_junction_gives_positive_peak_edge_does_not() {
        let img = x_junction(31, 15, 15);
        let resp = chess_response(&img.view());
        assert!(resp.at(15, 15) > 0.0);

        let mut edge = GrayImage::filled(31, 31, 30);
        for y in 0..31 {
            for x in 15..31 {
                edge.data[y * 31 + x] = 220;
            }
        }
        let resp = chess_response(&edge.view());
        assert!(resp.data.iter().all(|&v| v <= 0.0));
    }

    #[test]
    fn single_corner_is_found_with_diagonal_orientation() {
        let img = x_junction(41, 20, 20);
        let corners = find_corners(&img.view(), &ResponseParams::default());
        assert_eq!(corners.len(), 1);
        let c = corners[0];
        assert!((c.position.x - 19.5).abs() <= 1.0);
        assert!((c.position.y - 19.5).abs() <= 1.0);
        // Light quadrants lie along +x+y / -x-y, i.e. 45 degrees.
        let d = crate::geom::axis_vec_diff(c.orientation, std::f32::consts::FRAC_PI_4);
        assert!(d < 0.2, "orientation {}", c.orientation);
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::filled(64, 48, 128);
        assert!(find_corners(&img.view(), &ResponseParams::default()).is_empty());
    }
}
