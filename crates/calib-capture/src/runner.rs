//! Threaded driver for a [`Session`].
//!
//! [`FrameLoop::spawn`] moves the session onto a loop thread that waits for
//! engine readiness and then multiplexes four inputs with `select!`: the stop
//! signal, operator intents, display ticks and solve results (with an
//! optional solve deadline). Solves run on a separate worker thread so ticks
//! keep being served while the session is in `Solving`; they are no-ops there.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use calib_capture_core::{
    wait_until_ready_with, CalibrationHandoff, CalibrationResult, DetectionResult, EngineNotReady,
    FrameSource, SolveError, VisionEngine,
};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use image::RgbaImage;

use crate::session::{Session, SolveTicket};
use crate::state::{IntentOutcome, Notice, SessionView, SolveOutcome, TickOutcome};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Operator actions forwarded to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    StartCapture,
    ArmCapture,
    Finish,
    RequestCancel,
    ConfirmCancel,
    DenyCancel,
}

impl Intent {
    fn apply<E: VisionEngine, F: FrameSource>(self, session: &mut Session<E, F>) -> IntentOutcome {
        match self {
            Intent::StartCapture => session.start_capture(),
            Intent::ArmCapture => session.arm_capture(),
            Intent::Finish => session.finish(),
            Intent::RequestCancel => session.request_cancel(),
            Intent::ConfirmCancel => session.confirm_cancel(),
            Intent::DenyCancel => session.deny_cancel(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Engine readiness checks were exhausted; the loop has stopped.
    EngineUnavailable(EngineNotReady),
    Intent {
        intent: Intent,
        outcome: IntentOutcome,
    },
    /// The session view changed.
    View(SessionView),
    Notice(Notice),
    Solved(SolveOutcome),
    Handoff(CalibrationHandoff),
}

/// Rendered detection feedback for one processed tick.
#[derive(Clone, Debug)]
pub struct Overlay {
    pub image: RgbaImage,
    pub detection: DetectionResult,
}

/// Display refresh signal: one tick per received instant.
pub struct TickSignal(Receiver<Instant>);

impl TickSignal {
    /// Fixed-rate ticks.
    pub fn interval(period: Duration) -> Self {
        Self(crossbeam_channel::tick(period))
    }

    /// Ticks from an external source, e.g. a vsync callback.
    pub fn from_receiver(rx: Receiver<Instant>) -> Self {
        Self(rx)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn frame loop thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("frame loop is no longer running")]
    Stopped,
    #[error("frame loop thread panicked")]
    Panicked,
}

type SolveMessage = (SolveTicket, Result<CalibrationResult, SolveError>);

enum Step {
    Stop,
    TicksClosed,
    Intent(Intent),
    Tick,
    Solved(SolveMessage),
    Deadline,
}

pub struct FrameLoop;

impl FrameLoop {
    /// Move `session` onto a new loop thread.
    ///
    /// A `None` tick signal falls back to the configured tick interval.
    pub fn spawn<E, F>(
        session: Session<E, F>,
        ticks: Option<TickSignal>,
    ) -> Result<LoopHandle<E, F>, RunnerError>
    where
        E: VisionEngine + 'static,
        F: FrameSource + 'static,
    {
        let ticks =
            ticks.unwrap_or_else(|| TickSignal::interval(session.config().tick_interval()));
        let (intent_tx, intent_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (overlay_tx, overlay_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = LoopWorker {
            session,
            intents: intent_rx,
            ticks: ticks.0,
            stop: stop_rx,
            events: event_tx,
            overlays: overlay_tx,
            cancelled: cancelled.clone(),
            last_view: None,
        };
        let thread = std::thread::Builder::new()
            .name("calib-capture-loop".to_string())
            .spawn(move || worker.run())?;

        Ok(LoopHandle {
            intents: intent_tx,
            events: event_rx,
            overlays: overlay_rx,
            stop: stop_tx,
            cancelled,
            thread: Some(thread),
        })
    }
}

/// Owner-side handle of a running frame loop.
///
/// Dropping the handle stops the loop and waits for it to exit.
pub struct LoopHandle<E, F> {
    intents: Sender<Intent>,
    events: Receiver<SessionEvent>,
    overlays: Receiver<Overlay>,
    stop: Sender<()>,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<Session<E, F>>>,
}

impl<E, F> LoopHandle<E, F> {
    pub fn send(&self, intent: Intent) -> Result<(), RunnerError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(RunnerError::Stopped);
        }
        self.intents.send(intent).map_err(|_| RunnerError::Stopped)
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Latest overlay; older overlays are dropped when nobody reads them.
    pub fn overlays(&self) -> &Receiver<Overlay> {
        &self.overlays
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancel the loop and take the session back.
    pub fn stop(mut self) -> Result<Session<E, F>, RunnerError> {
        self.signal_stop();
        let thread = self.thread.take().ok_or(RunnerError::Stopped)?;
        thread.join().map_err(|_| RunnerError::Panicked)
    }

    fn signal_stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        let _ = self.stop.try_send(());
    }
}

impl<E, F> Drop for LoopHandle<E, F> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.signal_stop();
            if thread.join().is_err() {
                log::error!("frame loop thread panicked");
            }
        }
    }
}

struct LoopWorker<E, F> {
    session: Session<E, F>,
    intents: Receiver<Intent>,
    ticks: Receiver<Instant>,
    stop: Receiver<()>,
    events: Sender<SessionEvent>,
    overlays: Sender<Overlay>,
    cancelled: Arc<AtomicBool>,
    last_view: Option<SessionView>,
}

impl<E, F> LoopWorker<E, F>
where
    E: VisionEngine + 'static,
    F: FrameSource + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    fn run(mut self) -> Session<E, F> {
        if let Err(err) = self.wait_for_engine() {
            if !self.is_cancelled() {
                self.emit(SessionEvent::EngineUnavailable(err));
            }
            return self.session;
        }
        if self.is_cancelled() {
            return self.session;
        }
        log::info!("frame loop started");
        self.publish();

        let (solve_tx, solve_rx) = unbounded::<SolveMessage>();
        let stop = self.stop.clone();
        let intents = self.intents.clone();
        let ticks = self.ticks.clone();
        let mut deadline: Receiver<Instant> = never();
        let mut timeout: Option<(SolveTicket, Duration)> = None;

        loop {
            if self.is_cancelled() {
                break;
            }
            let step = select! {
                recv(stop) -> _ => Step::Stop,
                recv(intents) -> msg => msg.map(Step::Intent).unwrap_or(Step::Stop),
                recv(ticks) -> msg => msg.map(|_| Step::Tick).unwrap_or(Step::TicksClosed),
                recv(solve_rx) -> msg => msg.map(Step::Solved).unwrap_or(Step::Stop),
                recv(deadline) -> _ => Step::Deadline,
            };

            match step {
                Step::Stop => break,
                Step::TicksClosed => {
                    log::warn!("tick source closed, stopping frame loop");
                    break;
                }
                Step::Intent(intent) => {
                    let outcome = intent.apply(&mut self.session);
                    if let IntentOutcome::Ignored(reason) = outcome {
                        log::debug!("{intent:?} ignored: {reason}");
                    }
                    self.emit(SessionEvent::Intent { intent, outcome });
                }
                Step::Tick => {
                    if self.is_cancelled() {
                        break;
                    }
                    self.tick();
                }
                Step::Solved((ticket, result)) => {
                    if timeout.is_some_and(|(t, _)| t == ticket) {
                        deadline = never();
                        timeout = None;
                    }
                    let outcome = self.session.complete_solve(ticket, result);
                    self.emit(SessionEvent::Solved(outcome));
                }
                Step::Deadline => {
                    deadline = never();
                    if let Some((ticket, limit)) = timeout.take() {
                        log::warn!("calibration solve exceeded {limit:?}");
                        let outcome = self
                            .session
                            .complete_solve(ticket, Err(SolveError::TimedOut(limit)));
                        self.emit(SessionEvent::Solved(outcome));
                    }
                }
            }

            if let Some(ticket) = self.dispatch_solve(&solve_tx) {
                if let Some(limit) = self.session.config().solve_timeout() {
                    deadline = crossbeam_channel::at(Instant::now() + limit);
                    timeout = Some((ticket, limit));
                }
            }
            self.publish();
        }

        log::info!("frame loop stopped");
        self.session
    }

    fn wait_for_engine(&self) -> Result<u32, EngineNotReady> {
        let backoff = self.session.config().engine_backoff;
        let stop = self.stop.clone();
        let cancelled = self.cancelled.clone();
        wait_until_ready_with(self.session.engine(), &backoff, |delay| {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            if stop.recv_timeout(delay).is_ok() {
                cancelled.store(true, Ordering::Release);
            }
        })
    }

    fn tick(&mut self) {
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.session.tick())) {
            Ok(outcome) => outcome,
            Err(_) => {
                log::warn!("session tick panicked, tick skipped");
                return;
            }
        };
        if let TickOutcome::Processed(report) = outcome {
            let overlay = Overlay {
                image: report.overlay,
                detection: report.detection,
            };
            match self.overlays.try_send(overlay) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    log::trace!("overlay receiver gone");
                }
            }
        }
    }

    /// Hand a freshly started solve to a worker thread.
    fn dispatch_solve(&mut self, results: &Sender<SolveMessage>) -> Option<SolveTicket> {
        let job = self.session.take_solve_job()?;
        let ticket = job.ticket();
        let engine = Arc::clone(self.session.engine());
        let tx = results.clone();
        log::debug!("dispatching solve {ticket:?} over {} samples", job.sample_count());

        let spawned = std::thread::Builder::new()
            .name("calib-capture-solve".to_string())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| job.run(&engine)))
                    .unwrap_or(Err(SolveError::WorkerLost));
                let _ = tx.send((ticket, result));
            });
        if let Err(err) = spawned {
            log::error!("failed to spawn solve worker: {err}");
            let outcome = self
                .session
                .complete_solve(ticket, Err(SolveError::WorkerLost));
            self.emit(SessionEvent::Solved(outcome));
            return None;
        }
        Some(ticket)
    }

    /// Forward notices, view changes and the handoff payload.
    fn publish(&mut self) {
        for notice in self.session.drain_notices() {
            self.emit(SessionEvent::Notice(notice));
        }
        let view = self.session.view();
        if self.last_view != Some(view) {
            self.last_view = Some(view);
            self.emit(SessionEvent::View(view));
        }
        if let Some(handoff) = self.session.take_handoff() {
            self.emit(SessionEvent::Handoff(handoff));
        }
    }
}
