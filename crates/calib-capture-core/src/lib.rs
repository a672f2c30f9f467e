//! Core types and adapter traits for interactive camera calibration sessions.
//!
//! This crate holds the data model shared by the session orchestrator and the
//! export tooling, plus the two adapter seams through which the orchestrator
//! talks to the outside world:
//! - [`VisionEngine`]: board detection, calibration solve and rendering,
//! - [`FrameSource`]: the live capture device.
//!
//! It does *not* implement marker detection or the calibration optimizer;
//! those live behind [`VisionEngine`].

mod calibration;
mod detection;
mod engine;
mod frame;
mod handoff;
mod logger;
mod sample;
mod source;

pub use calibration::{CalibrationResult, DistortionCoefficients};
pub use detection::{DetectionResult, MarkerObservation};
pub use engine::{
    wait_until_ready, wait_until_ready_with, DetectError, EngineNotReady, EngineStatus,
    ReadinessBackoff, SolveError, VisionEngine,
};
pub use frame::{Frame, FrameError, FrameSize, Thumbnail, ThumbnailError};
pub use handoff::CalibrationHandoff;
pub use sample::Sample;
pub use source::{DeviceStatus, FramePoll, FrameSource};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
