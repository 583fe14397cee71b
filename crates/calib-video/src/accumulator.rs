use calib_video_core::Correspondence;
use nalgebra::{Point2, Point3};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    #[error("{object} pattern points but {image} detections")]
    LengthMismatch { object: usize, image: usize },
}

/// Append-only store of per-frame correspondences.
///
/// Entries keep their arrival order; there is no way to remove or reorder
/// them once recorded.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceAccumulator {
    samples: Vec<Correspondence>,
}

impl CorrespondenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's pattern points and their detections.
    pub fn record(
        &mut self,
        object: Vec<Point3<f64>>,
        image: Vec<Point2<f64>>,
    ) -> Result<(), AccumulatorError> {
        if object.len() != image.len() {
            return Err(AccumulatorError::LengthMismatch {
                object: object.len(),
                image: image.len(),
            });
        }
        self.samples.push(Correspondence::new(object, image));
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether at least `min_samples` frames have been recorded.
    #[inline]
    pub fn is_ready(&self, min_samples: usize) -> bool {
        self.samples.len() >= min_samples
    }

    /// The first `max_samples` entries (or all of them), in recording order.
    pub fn snapshot(&self, max_samples: usize) -> &[Correspondence] {
        &self.samples[..self.samples.len().min(max_samples)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tag: f64) -> (Vec<Point3<f64>>, Vec<Point2<f64>>) {
        (
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            vec![Point2::new(tag, 0.0), Point2::new(tag, 1.0)],
        )
    }

    #[test]
    fn readiness_follows_count() {
        let mut acc = CorrespondenceAccumulator::new();
        for k in 0..5 {
            assert!(!acc.is_ready(5));
            let (o, i) = sample(k as f64);
            acc.record(o, i).expect("record");
        }
        assert!(acc.is_ready(5));
        assert!(acc.is_ready(0));
    }

    #[test]
    fn snapshot_is_an_ordered_prefix_bounded_by_cap() {
        let mut acc = CorrespondenceAccumulator::new();
        for k in 0..7 {
            let (o, i) = sample(k as f64);
            acc.record(o, i).expect("record");
        }
        let snap = acc.snapshot(4);
        assert_eq!(snap.len(), 4);
        for (k, c) in snap.iter().enumerate() {
            assert_eq!(c.image[0].x, k as f64);
        }
        assert_eq!(acc.snapshot(50).len(), 7);
        assert!(acc.snapshot(0).is_empty());
    }

    #[test]
    fn mismatched_lengths_are_not_recorded() {
        let mut acc = CorrespondenceAccumulator::new();
        let (o, mut i) = sample(0.0);
        i.pop();
        assert_eq!(
            acc.record(o, i),
            Err(AccumulatorError::LengthMismatch { object: 2, image: 1 })
        );
        assert!(acc.is_empty());
    }
}
