//! Vision engine adapter seam.
//!
//! The engine is an opaque, externally provided capability set: board
//! detection, the calibration solve and two renderers. Implementations must be
//! stateless per call and shareable across threads, because the solve runs on
//! a worker while the detection loop is suspended.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationResult;
use crate::detection::DetectionResult;
use crate::frame::{Frame, FrameSize};
use crate::sample::Sample;

/// Whether the engine has finished loading its resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Ready,
    Loading,
}

/// Errors returned by [`VisionEngine::detect_board`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// The frame cannot be read yet; the tick is skipped, not treated as "no board".
    #[error("frame not ready for detection")]
    FrameNotReady,
    #[error("board detection failed: {0}")]
    Engine(String),
}

/// Errors that end a calibration attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("insufficient or inconsistent calibration data: {reason}")]
    InsufficientOrInconsistentData { reason: String },

    #[error(
        "solver returned {rotations} rotation / {translations} translation vectors for {samples} samples"
    )]
    MisalignedResult {
        samples: usize,
        rotations: usize,
        translations: usize,
    },

    #[error("solver returned an invalid reprojection error ({0})")]
    InvalidReprojectionError(f64),

    #[error("calibration solve timed out after {0:?}")]
    TimedOut(Duration),

    #[error("calibration worker exited without a result")]
    WorkerLost,
}

impl SolveError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        SolveError::InsufficientOrInconsistentData {
            reason: reason.into(),
        }
    }
}

/// Typed interface over the external vision engine.
pub trait VisionEngine: Send + Sync {
    /// Readiness of the engine's resources (dictionaries, board model, ...).
    fn readiness(&self) -> EngineStatus {
        EngineStatus::Ready
    }

    /// Detect the calibration board in one frame.
    ///
    /// Callers treat every error except [`DetectError::FrameNotReady`] as
    /// [`DetectionResult::NoBoard`] for that tick.
    fn detect_board(&self, frame: &Frame) -> Result<DetectionResult, DetectError>;

    /// Solve camera intrinsics from the ordered samples.
    ///
    /// Expensive and unbounded in time; never called from the detection tick.
    fn solve_calibration(
        &self,
        samples: &[Arc<Sample>],
        frame_size: FrameSize,
    ) -> Result<CalibrationResult, SolveError>;

    /// Draw detection feedback over the frame. Must always return a displayable image.
    fn render_overlay(&self, frame: &Frame, detection: &DetectionResult) -> RgbaImage;

    /// Render the printable board as a `side` × `side` image.
    fn render_board_image(&self, side: u32) -> GrayImage;
}

impl<E: VisionEngine + ?Sized> VisionEngine for Arc<E> {
    fn readiness(&self) -> EngineStatus {
        (**self).readiness()
    }

    fn detect_board(&self, frame: &Frame) -> Result<DetectionResult, DetectError> {
        (**self).detect_board(frame)
    }

    fn solve_calibration(
        &self,
        samples: &[Arc<Sample>],
        frame_size: FrameSize,
    ) -> Result<CalibrationResult, SolveError> {
        (**self).solve_calibration(samples, frame_size)
    }

    fn render_overlay(&self, frame: &Frame, detection: &DetectionResult) -> RgbaImage {
        (**self).render_overlay(frame, detection)
    }

    fn render_board_image(&self, side: u32) -> GrayImage {
        (**self).render_board_image(side)
    }
}

/// Bounded exponential backoff for engine readiness polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessBackoff {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReadinessBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 2_000,
            max_attempts: 40,
        }
    }
}

impl ReadinessBackoff {
    /// Delay before retry number `attempt` (0-based), doubling up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms.max(self.initial_delay_ms));
        Duration::from_millis(ms)
    }
}

/// The engine did not report [`EngineStatus::Ready`] within the backoff budget.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("vision engine still loading after {attempts} readiness checks ({waited:?})")]
pub struct EngineNotReady {
    pub attempts: u32,
    pub waited: Duration,
}

/// Poll the engine until it is ready, sleeping between checks.
///
/// Returns the number of checks performed.
pub fn wait_until_ready<E: VisionEngine + ?Sized>(
    engine: &E,
    backoff: &ReadinessBackoff,
) -> Result<u32, EngineNotReady> {
    wait_until_ready_with(engine, backoff, std::thread::sleep)
}

/// Same as [`wait_until_ready`] with an injectable sleep function.
pub fn wait_until_ready_with<E, S>(
    engine: &E,
    backoff: &ReadinessBackoff,
    mut sleep: S,
) -> Result<u32, EngineNotReady>
where
    E: VisionEngine + ?Sized,
    S: FnMut(Duration),
{
    let started = Instant::now();
    let max_attempts = backoff.max_attempts.max(1);
    let mut waited = Duration::ZERO;
    for attempt in 0..max_attempts {
        if engine.readiness() == EngineStatus::Ready {
            log::debug!("vision engine ready after {} check(s)", attempt + 1);
            return Ok(attempt + 1);
        }
        if attempt + 1 < max_attempts {
            let delay = backoff.delay(attempt);
            log::trace!("vision engine loading, retrying in {delay:?}");
            sleep(delay);
            waited += delay;
        }
    }
    let waited = waited.max(started.elapsed());
    log::warn!("vision engine not ready after {max_attempts} checks");
    Err(EngineNotReady {
        attempts: max_attempts,
        waited,
    })
}
