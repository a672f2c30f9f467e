//! Session states and the values the session reports back to its driver.

use std::fmt;

use calib_capture_core::{DetectionResult, FrameSize, SolveError};
use image::RgbaImage;

/// Sub-state of [`SessionState::Live`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LivePhase {
    /// Detect and draw; the store is never touched.
    Detecting,
    /// The next refined detection becomes a sample.
    Armed,
}

/// Why a solve is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolvePurpose {
    /// Triggered by `finish`; success ends the session.
    Finish,
    /// Triggered by an accepted sample when preview solves are enabled.
    Preview,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingDevice,
    Live(LivePhase),
    Solving(SolvePurpose),
    Finished,
}

impl SessionState {
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Live(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::AwaitingDevice => f.write_str("awaiting device"),
            SessionState::Live(LivePhase::Detecting) => f.write_str("live (detecting)"),
            SessionState::Live(LivePhase::Armed) => f.write_str("live (armed)"),
            SessionState::Solving(SolvePurpose::Finish) => f.write_str("solving"),
            SessionState::Solving(SolvePurpose::Preview) => f.write_str("solving (preview)"),
            SessionState::Finished => f.write_str("finished"),
        }
    }
}

/// Read-only projection of the session for presentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionView {
    pub state: SessionState,
    pub sample_count: usize,
    pub frame_size: Option<FrameSize>,
    /// Reprojection error of the latest accepted solve, if any.
    pub reprojection_error: Option<f64>,
    pub can_finish: bool,
    pub cancel_pending: bool,
}

/// Operator-facing messages raised by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    /// An armed capture saw no usable board; the arm was cleared.
    BoardNotFound,
    /// The solve rejected the data; the session rolled back.
    CalibrationRejected { reason: SolveError },
    CalibrationSucceeded {
        reprojection_error: f64,
        samples: usize,
    },
    /// The capture device reported a failure; the session keeps waiting.
    DeviceUnavailable { reason: String },
}

/// Why an intent had no effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoredIntent {
    InvalidState(SessionState),
    AlreadyArmed,
    NoSamples,
    /// A cancel confirmation is outstanding.
    CancelPending,
    NoCancelPending,
}

impl fmt::Display for IgnoredIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoredIntent::InvalidState(state) => write!(f, "not available while {state}"),
            IgnoredIntent::AlreadyArmed => f.write_str("capture already armed"),
            IgnoredIntent::NoSamples => f.write_str("no samples captured yet"),
            IgnoredIntent::CancelPending => f.write_str("waiting for cancel confirmation"),
            IgnoredIntent::NoCancelPending => f.write_str("no cancel requested"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum IntentOutcome {
    Applied,
    Ignored(IgnoredIntent),
}

impl IntentOutcome {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, IntentOutcome::Applied)
    }
}

/// What an armed tick did with its detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    NotArmed,
    Accepted { index: usize },
    BoardNotFound,
    /// Refined corners were found but could not become a sample.
    Rejected(String),
}

/// Result of one tick.
#[derive(Clone, Debug)]
pub enum TickOutcome {
    /// Idle, solving or finished: the tick did nothing.
    Inactive,
    DevicePending,
    DeviceFailed(String),
    DeviceReady,
    /// No frame this tick; state is unchanged.
    FrameNotReady,
    /// The engine panicked during detection; the tick was skipped.
    EngineFault,
    Processed(TickReport),
}

#[derive(Clone, Debug)]
pub struct TickReport {
    pub detection: DetectionResult,
    pub overlay: RgbaImage,
    pub capture: CaptureOutcome,
}

/// Result of handing a solve result back to the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveOutcome {
    Finished { samples: usize },
    Previewed { reprojection_error: f64 },
    Rejected(SolveError),
    /// The ticket no longer matches the in-flight solve; the result was dropped.
    Stale,
}
