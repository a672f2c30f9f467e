//! Interactive ChArUco capture sessions.
//!
//! This crate provides:
//! - [`Session`]: the capture state machine. It accumulates board
//!   observations, gates the calibration solve and rolls back cleanly when
//!   the solve rejects the latest sample.
//! - [`FrameLoop`]: a threaded driver that ticks the session on a display
//!   signal, runs solves off the tick thread and reports [`SessionEvent`]s.
//! - [`SessionConfig`]: board geometry and session tuning, loadable from JSON.
//!
//! The vision engine and the camera are supplied by the caller through the
//! [`VisionEngine`](core::VisionEngine) and [`FrameSource`](core::FrameSource)
//! traits.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use calib_capture::{Session, SessionConfig, SolveOutcome};
//! # use calib_capture::core::*;
//! # fn run<E: VisionEngine, F: FrameSource>(engine: E, camera: F) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(Arc::new(engine), camera, SessionConfig::default())?;
//! let _ = session.start_capture();
//! session.tick(); // device ready -> live
//! let _ = session.arm_capture();
//! session.tick(); // the next refined detection becomes a sample
//! let _ = session.finish();
//! if let Some(SolveOutcome::Finished { .. }) = session.solve_blocking() {
//!     let handoff = session.take_handoff();
//!     println!("calibrated over {:?} samples", handoff.map(|h| h.sample_count()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_capture::core`: frames, detections, samples, calibration results, adapter traits.
//! - `calib_capture::export`: text transcript and zip packaging of a finished session.

pub use calib_capture_core as core;
pub use calib_capture_export as export;

mod config;
mod runner;
mod session;
mod state;
mod store;

pub use config::{
    dictionary_capacity, BoardSpec, ConfigError, ConfigIoError, SessionConfig, ThumbnailConfig,
};
pub use runner::{FrameLoop, Intent, LoopHandle, Overlay, RunnerError, SessionEvent, TickSignal};
pub use session::{Session, SessionSnapshot, SolveJob, SolveTicket};
pub use state::{
    CaptureOutcome, IgnoredIntent, IntentOutcome, LivePhase, Notice, SessionState, SessionView,
    SolveOutcome, SolvePurpose, TickOutcome, TickReport,
};
pub use store::{SampleStore, StoreSnapshot};

pub use calib_capture_core::{CalibrationHandoff, CalibrationResult, DetectionResult, Frame};
