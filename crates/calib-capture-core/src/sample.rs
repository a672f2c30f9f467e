use std::time::SystemTime;

use nalgebra::Point2;

use crate::frame::Thumbnail;

/// One accepted board observation.
///
/// Samples are immutable once created; the sample store shares them behind
/// `Arc` so snapshots and solve jobs never copy corner data.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    corners: Vec<Point2<f32>>,
    ids: Vec<u32>,
    thumbnail: Thumbnail,
    captured_at: SystemTime,
}

impl Sample {
    /// Build a sample from index-aligned corners and ids.
    pub fn new(
        corners: Vec<Point2<f32>>,
        ids: Vec<u32>,
        thumbnail: Thumbnail,
        captured_at: SystemTime,
    ) -> Self {
        debug_assert_eq!(corners.len(), ids.len());
        Self {
            corners,
            ids,
            thumbnail,
            captured_at,
        }
    }

    #[inline]
    pub fn corners(&self) -> &[Point2<f32>] {
        &self.corners
    }

    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }

    #[inline]
    pub fn thumbnail(&self) -> &Thumbnail {
        &self.thumbnail
    }

    #[inline]
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}
