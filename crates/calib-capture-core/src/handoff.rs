use crate::calibration::CalibrationResult;
use crate::frame::Thumbnail;

/// Final artifact handed to the presentation layer when a session finishes.
///
/// `thumbnails[i]` is the image of the sample whose pose is
/// `result.rotation_vectors[i]` / `result.translation_vectors[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationHandoff {
    pub result: CalibrationResult,
    pub thumbnails: Vec<Thumbnail>,
}

impl CalibrationHandoff {
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.thumbnails.len()
    }
}
