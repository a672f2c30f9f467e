use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A decoded fiducial marker with its four image-space corners (TL, TR, BR, BL).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub id: u32,
    pub corners: [Point2<f32>; 4],
}

/// Outcome of one board detection on one frame.
///
/// Produced fresh every tick and never mutated; it is consumed by the overlay
/// render and, while armed, by sample creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DetectionResult {
    /// Nothing recognisable in the frame.
    #[default]
    NoBoard,
    /// Markers were decoded but board corners could not be interpolated.
    MarkersOnly { markers: Vec<MarkerObservation> },
    /// Interpolated board corners with their board-level ids (index-aligned).
    RefinedCorners {
        corners: Vec<Point2<f32>>,
        ids: Vec<u32>,
    },
}

impl DetectionResult {
    #[inline]
    pub fn is_refined(&self) -> bool {
        matches!(self, DetectionResult::RefinedCorners { .. })
    }

    /// Number of refined board corners (zero unless refined).
    pub fn corner_count(&self) -> usize {
        match self {
            DetectionResult::RefinedCorners { corners, .. } => corners.len(),
            _ => 0,
        }
    }

    /// Number of decoded markers (zero unless markers-only).
    pub fn marker_count(&self) -> usize {
        match self {
            DetectionResult::MarkersOnly { markers } => markers.len(),
            _ => 0,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            DetectionResult::NoBoard => "no board",
            DetectionResult::MarkersOnly { .. } => "markers only",
            DetectionResult::RefinedCorners { .. } => "refined corners",
        }
    }
}
