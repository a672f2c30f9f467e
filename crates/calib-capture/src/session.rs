//! Capture session state machine.
//!
//! [`Session`] owns every piece of mutable capture state. It is driven from
//! outside: the operator's intents arrive through the intent methods, the
//! display cadence through [`Session::tick`], and the calibration solve is
//! handed out as a [`SolveJob`] and handed back through
//! [`Session::complete_solve`]. Nothing here blocks except
//! [`Session::solve_blocking`].

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use calib_capture_core::{
    CalibrationHandoff, CalibrationResult, DetectError, DetectionResult, DeviceStatus, Frame,
    FramePoll, FrameSize, FrameSource, Sample, SolveError, VisionEngine,
};
use image::{imageops, GrayImage};

use crate::config::{ConfigError, SessionConfig};
use crate::state::{
    CaptureOutcome, IgnoredIntent, IntentOutcome, LivePhase, Notice, SessionState, SessionView,
    SolveOutcome, SolvePurpose, TickOutcome, TickReport,
};
use crate::store::{SampleStore, StoreSnapshot};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Identifies one solve attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolveTicket(u64);

/// Work order for the calibration solve, detached from the session.
#[derive(Clone, Debug)]
pub struct SolveJob {
    ticket: SolveTicket,
    purpose: SolvePurpose,
    samples: Vec<Arc<Sample>>,
    frame_size: FrameSize,
}

impl SolveJob {
    #[inline]
    pub fn ticket(&self) -> SolveTicket {
        self.ticket
    }

    #[inline]
    pub fn purpose(&self) -> SolvePurpose {
        self.purpose
    }

    #[inline]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn run<E: VisionEngine + ?Sized>(&self, engine: &E) -> Result<CalibrationResult, SolveError> {
        engine.solve_calibration(&self.samples, self.frame_size)
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Calibrated {
    result: CalibrationResult,
    basis: StoreSnapshot,
}

/// State saved when a capture is armed, restored if the next solve fails.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    store: StoreSnapshot,
    calibrated: Option<Calibrated>,
}

impl SessionSnapshot {
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.store.count()
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibrated.as_ref().map(|c| &c.result)
    }

    /// Store contents a rollback returns to.
    #[inline]
    pub fn store(&self) -> &StoreSnapshot {
        &self.store
    }
}

pub struct Session<E, F> {
    engine: Arc<E>,
    source: F,
    config: SessionConfig,
    state: SessionState,
    store: SampleStore,
    calibrated: Option<Calibrated>,
    snapshot: Option<SessionSnapshot>,
    cancel_pending: bool,
    in_flight: Option<SolveTicket>,
    job: Option<SolveJob>,
    next_ticket: u64,
    handoff: Option<CalibrationHandoff>,
    notices: VecDeque<Notice>,
    device_failure: Option<String>,
}

impl<E, F> Session<E, F>
where
    E: VisionEngine,
    F: FrameSource,
{
    pub fn new(engine: Arc<E>, source: F, config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine,
            source,
            config,
            state: SessionState::Idle,
            store: SampleStore::new(),
            calibrated: None,
            snapshot: None,
            cancel_pending: false,
            in_flight: None,
            job: None,
            next_ticket: 0,
            handoff: None,
            notices: VecDeque::new(),
            device_failure: None,
        })
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Latest accepted calibration.
    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibrated.as_ref().map(|c| &c.result)
    }

    /// Rollback point of the most recent arm, if not yet consumed.
    pub fn pending_snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn can_finish(&self) -> bool {
        self.state.is_live() && !self.store.is_empty() && !self.cancel_pending
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            sample_count: self.store.count(),
            frame_size: self.store.frame_size(),
            reprojection_error: self.calibration().map(|c| c.reprojection_error),
            can_finish: self.can_finish(),
            cancel_pending: self.cancel_pending,
        }
    }

    /// Drain operator notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Take the final payload. Returns `Some` once per finished session.
    pub fn take_handoff(&mut self) -> Option<CalibrationHandoff> {
        self.handoff.take()
    }

    // ---- intents --------------------------------------------------------

    pub fn start_capture(&mut self) -> IntentOutcome {
        if self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::CancelPending);
        }
        if self.state != SessionState::Idle {
            return IntentOutcome::Ignored(IgnoredIntent::InvalidState(self.state));
        }
        self.transition(SessionState::AwaitingDevice);
        IntentOutcome::Applied
    }

    /// Arm the next refined detection for capture and save the rollback point.
    pub fn arm_capture(&mut self) -> IntentOutcome {
        if self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::CancelPending);
        }
        match self.state {
            SessionState::Live(LivePhase::Detecting) => {
                self.snapshot = Some(SessionSnapshot {
                    store: self.store.snapshot(),
                    calibrated: self.calibrated.clone(),
                });
                self.transition(SessionState::Live(LivePhase::Armed));
                IntentOutcome::Applied
            }
            SessionState::Live(LivePhase::Armed) => {
                IntentOutcome::Ignored(IgnoredIntent::AlreadyArmed)
            }
            state => IntentOutcome::Ignored(IgnoredIntent::InvalidState(state)),
        }
    }

    /// Run the final solve, or hand off directly when the latest preview
    /// solve already covers every sample.
    pub fn finish(&mut self) -> IntentOutcome {
        if self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::CancelPending);
        }
        if !self.state.is_live() {
            return IntentOutcome::Ignored(IgnoredIntent::InvalidState(self.state));
        }
        if self.store.is_empty() {
            return IntentOutcome::Ignored(IgnoredIntent::NoSamples);
        }

        let current = self
            .calibrated
            .as_ref()
            .filter(|c| self.store.matches(&c.basis))
            .map(|c| c.result.clone());
        match current {
            Some(result) => {
                log::info!(
                    "finishing with preview calibration over {} samples",
                    self.store.count()
                );
                self.finish_with(result);
            }
            None => {
                if self.state == SessionState::Live(LivePhase::Armed) {
                    log::debug!("finish dropped a pending capture arm");
                }
                self.begin_solve(SolvePurpose::Finish);
            }
        }
        IntentOutcome::Applied
    }

    pub fn request_cancel(&mut self) -> IntentOutcome {
        if self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::CancelPending);
        }
        match self.state {
            SessionState::AwaitingDevice | SessionState::Live(_) | SessionState::Finished => {
                self.cancel_pending = true;
                log::debug!("cancel requested while {}", self.state);
                IntentOutcome::Applied
            }
            state => IntentOutcome::Ignored(IgnoredIntent::InvalidState(state)),
        }
    }

    /// Discard everything and return to `Idle`.
    pub fn confirm_cancel(&mut self) -> IntentOutcome {
        if !self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::NoCancelPending);
        }
        self.cancel_pending = false;
        self.store.clear();
        self.calibrated = None;
        self.snapshot = None;
        self.in_flight = None;
        self.job = None;
        self.handoff = None;
        self.device_failure = None;
        self.source.release();
        self.transition(SessionState::Idle);
        IntentOutcome::Applied
    }

    pub fn deny_cancel(&mut self) -> IntentOutcome {
        if !self.cancel_pending {
            return IntentOutcome::Ignored(IgnoredIntent::NoCancelPending);
        }
        self.cancel_pending = false;
        log::debug!("cancel withdrawn");
        IntentOutcome::Applied
    }

    // ---- loop -----------------------------------------------------------

    /// Advance the session by one display tick.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(state = %self.state)))]
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            SessionState::AwaitingDevice => self.poll_device(),
            SessionState::Live(phase) => self.process_frame(phase),
            SessionState::Idle | SessionState::Solving(_) | SessionState::Finished => {
                TickOutcome::Inactive
            }
        }
    }

    fn poll_device(&mut self) -> TickOutcome {
        match self.source.poll_device() {
            DeviceStatus::Ready => {
                self.device_failure = None;
                self.transition(SessionState::Live(LivePhase::Detecting));
                TickOutcome::DeviceReady
            }
            DeviceStatus::Pending => TickOutcome::DevicePending,
            DeviceStatus::Failed(reason) => {
                if self.device_failure.as_deref() != Some(reason.as_str()) {
                    log::warn!("capture device unavailable: {reason}");
                    self.notices.push_back(Notice::DeviceUnavailable {
                        reason: reason.clone(),
                    });
                    self.device_failure = Some(reason.clone());
                }
                TickOutcome::DeviceFailed(reason)
            }
        }
    }

    fn process_frame(&mut self, phase: LivePhase) -> TickOutcome {
        let frame = match self.source.current_frame() {
            FramePoll::Ready(frame) => frame,
            FramePoll::NotReady => {
                log::trace!("frame not ready, tick skipped");
                return TickOutcome::FrameNotReady;
            }
        };

        let detected = catch_unwind(AssertUnwindSafe(|| self.engine.detect_board(&frame)));
        let detection = match detected {
            Err(_) => {
                log::warn!("vision engine panicked during detection, tick skipped");
                return TickOutcome::EngineFault;
            }
            Ok(Ok(detection)) => detection,
            Ok(Err(DetectError::FrameNotReady)) => {
                log::trace!("engine could not read frame, tick skipped");
                return TickOutcome::FrameNotReady;
            }
            Ok(Err(err)) => {
                log::debug!("detection failed, treating as no board: {err}");
                DetectionResult::NoBoard
            }
        };

        let overlay = catch_unwind(AssertUnwindSafe(|| {
            self.engine.render_overlay(&frame, &detection)
        }))
        .unwrap_or_else(|_| {
            log::warn!("vision engine panicked while drawing the overlay, showing the raw frame");
            frame.image().clone()
        });
        let capture = match phase {
            LivePhase::Detecting => CaptureOutcome::NotArmed,
            LivePhase::Armed => self.capture(&frame, &detection),
        };

        TickOutcome::Processed(TickReport {
            detection,
            overlay,
            capture,
        })
    }

    /// Consume the arm with this tick's detection.
    fn capture(&mut self, frame: &Frame, detection: &DetectionResult) -> CaptureOutcome {
        self.transition(SessionState::Live(LivePhase::Detecting));

        let outcome = match detection {
            DetectionResult::RefinedCorners { corners, ids } => {
                self.make_sample(frame, corners, ids)
            }
            _ => CaptureOutcome::BoardNotFound,
        };

        match &outcome {
            CaptureOutcome::Accepted { index } => {
                log::info!(
                    "sample {} accepted ({} corners)",
                    index + 1,
                    detection.corner_count()
                );
                if self.config.solve_on_capture {
                    self.begin_solve(SolvePurpose::Preview);
                }
            }
            CaptureOutcome::BoardNotFound => {
                log::warn!("board not found ({})", detection.label());
                self.notices.push_back(Notice::BoardNotFound);
            }
            CaptureOutcome::Rejected(reason) => {
                log::warn!("detection not usable as a sample: {reason}");
                self.notices.push_back(Notice::BoardNotFound);
            }
            CaptureOutcome::NotArmed => {}
        }
        outcome
    }

    fn make_sample(
        &mut self,
        frame: &Frame,
        corners: &[nalgebra::Point2<f32>],
        ids: &[u32],
    ) -> CaptureOutcome {
        if corners.is_empty() {
            return CaptureOutcome::BoardNotFound;
        }
        if corners.len() != ids.len() {
            return CaptureOutcome::Rejected(format!(
                "{} corners but {} ids",
                corners.len(),
                ids.len()
            ));
        }
        if !self.config.board.accepts_ids(ids) {
            return CaptureOutcome::Rejected(format!(
                "corner id outside the {} inner corners of the board",
                self.config.board.inner_corner_count()
            ));
        }
        let thumbnail = match frame.thumbnail(self.config.thumbnail.max_side) {
            Ok(thumbnail) => thumbnail,
            Err(err) => return CaptureOutcome::Rejected(format!("thumbnail: {err}")),
        };
        let sample = Sample::new(
            corners.to_vec(),
            ids.to_vec(),
            thumbnail,
            frame.captured_at(),
        );
        let index = self.store.append(sample, frame.size());
        CaptureOutcome::Accepted { index }
    }

    // ---- solve ----------------------------------------------------------

    fn begin_solve(&mut self, purpose: SolvePurpose) {
        let Some(frame_size) = self.store.frame_size() else {
            return;
        };
        self.next_ticket += 1;
        let ticket = SolveTicket(self.next_ticket);
        self.job = Some(SolveJob {
            ticket,
            purpose,
            samples: self.store.shared(),
            frame_size,
        });
        self.in_flight = Some(ticket);
        self.transition(SessionState::Solving(purpose));
    }

    /// Take the pending solve work order, if a solve was just started.
    pub fn take_solve_job(&mut self) -> Option<SolveJob> {
        self.job.take()
    }

    /// Ticket of the solve the session is waiting on.
    #[inline]
    pub fn solve_in_flight(&self) -> Option<SolveTicket> {
        self.in_flight
    }

    /// Apply the outcome of a solve started by this session.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, result), fields(samples = self.store.count())))]
    pub fn complete_solve(
        &mut self,
        ticket: SolveTicket,
        result: Result<CalibrationResult, SolveError>,
    ) -> SolveOutcome {
        let purpose = match self.state {
            SessionState::Solving(purpose) if self.in_flight == Some(ticket) => purpose,
            _ => {
                log::debug!("dropping result of stale solve {ticket:?}");
                return SolveOutcome::Stale;
            }
        };
        self.in_flight = None;
        self.job = None;

        let samples = self.store.count();
        let checked = result.and_then(|r| r.check_against(samples).map(|()| r));
        match checked {
            Ok(result) => {
                let reprojection_error = result.reprojection_error;
                log::info!(
                    "calibration accepted: {samples} samples, reprojection error {reprojection_error:.4}"
                );
                self.notices.push_back(Notice::CalibrationSucceeded {
                    reprojection_error,
                    samples,
                });
                self.snapshot = None;
                match purpose {
                    SolvePurpose::Finish => {
                        self.finish_with(result);
                        SolveOutcome::Finished { samples }
                    }
                    SolvePurpose::Preview => {
                        self.calibrated = Some(Calibrated {
                            result,
                            basis: self.store.snapshot(),
                        });
                        self.transition(SessionState::Live(LivePhase::Detecting));
                        SolveOutcome::Previewed { reprojection_error }
                    }
                }
            }
            Err(err) => {
                log::warn!("calibration rejected: {err}");
                self.rollback();
                self.notices.push_back(Notice::CalibrationRejected {
                    reason: err.clone(),
                });
                self.transition(SessionState::Live(LivePhase::Detecting));
                SolveOutcome::Rejected(err)
            }
        }
    }

    /// Run the pending solve on the calling thread.
    pub fn solve_blocking(&mut self) -> Option<SolveOutcome> {
        let job = self.take_solve_job()?;
        let result = job.run(&self.engine);
        Some(self.complete_solve(job.ticket, result))
    }

    /// Restore the rollback point of the last arm. No-op without one.
    fn rollback(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            log::debug!("no rollback point, store left as is");
            return;
        };
        let dropped = self.store.count().saturating_sub(snapshot.store.count());
        self.store.restore(&snapshot.store);
        self.calibrated = snapshot.calibrated;
        log::info!(
            "rolled back {dropped} sample(s), {} remain",
            self.store.count()
        );
    }

    fn finish_with(&mut self, result: CalibrationResult) {
        self.handoff = Some(CalibrationHandoff {
            result: result.clone(),
            thumbnails: self.store.thumbnails(),
        });
        self.calibrated = Some(Calibrated {
            result,
            basis: self.store.snapshot(),
        });
        self.snapshot = None;
        self.source.release();
        self.transition(SessionState::Finished);
    }

    // ---- board ----------------------------------------------------------

    /// Printable board, mirrored horizontally.
    pub fn board_image(&self) -> GrayImage {
        let board = self
            .engine
            .render_board_image(self.config.board_image_side);
        imageops::flip_horizontal(&board)
    }

    pub fn save_board_png(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.board_image()
            .save_with_format(path, image::ImageFormat::Png)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("session: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
