//! Calibration solve output.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::engine::SolveError;

/// Radial/tangential distortion in the five-term `[k1, k2, p1, p2, k3]` layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistortionCoefficients(pub [f64; 5]);

impl DistortionCoefficients {
    pub const LEN: usize = 5;

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[inline]
    pub fn k1(&self) -> f64 {
        self.0[0]
    }

    #[inline]
    pub fn k2(&self) -> f64 {
        self.0[1]
    }

    #[inline]
    pub fn p1(&self) -> f64 {
        self.0[2]
    }

    #[inline]
    pub fn p2(&self) -> f64 {
        self.0[3]
    }

    #[inline]
    pub fn k3(&self) -> f64 {
        self.0[4]
    }
}

/// Result of a successful intrinsic calibration solve.
///
/// `rotation_vectors[i]` / `translation_vectors[i]` are the board pose of the
/// i-th sample in store order at solve time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// RMS reprojection error in pixels.
    pub reprojection_error: f64,
    /// Camera matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub intrinsics: Matrix3<f64>,
    pub distortion: DistortionCoefficients,
    /// Rodrigues rotation vectors, one per sample.
    pub rotation_vectors: Vec<Vector3<f64>>,
    /// Translation vectors in board units, one per sample.
    pub translation_vectors: Vec<Vector3<f64>>,
}

impl CalibrationResult {
    /// Number of per-sample poses, or `None` if rotations and translations disagree.
    pub fn pose_count(&self) -> Option<usize> {
        let n = self.rotation_vectors.len();
        (n == self.translation_vectors.len()).then_some(n)
    }

    /// Check the structural invariants a solve result must satisfy for `samples` inputs.
    pub fn check_against(&self, samples: usize) -> Result<(), SolveError> {
        if !self.reprojection_error.is_finite() || self.reprojection_error < 0.0 {
            return Err(SolveError::InvalidReprojectionError(
                self.reprojection_error,
            ));
        }
        if self.pose_count() != Some(samples) {
            return Err(SolveError::MisalignedResult {
                samples,
                rotations: self.rotation_vectors.len(),
                translations: self.translation_vectors.len(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.intrinsics[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.intrinsics[(1, 1)]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.intrinsics[(0, 2)]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.intrinsics[(1, 2)]
    }
}
