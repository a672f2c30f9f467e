#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use calib_capture::core::{
    CalibrationResult, DetectError, DetectionResult, DeviceStatus, DistortionCoefficients,
    EngineStatus, Frame, FramePoll, FrameSize, FrameSource, MarkerObservation, Sample, SolveError,
    VisionEngine,
};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use nalgebra::{Matrix3, Point2, Vector3};

pub const FRAME_W: u32 = 64;
pub const FRAME_H: u32 = 48;

/// Scripted behavior of the next `solve_calibration` call.
#[derive(Clone, Debug)]
pub enum SolveScript {
    Succeed { reprojection_error: f64 },
    Fail(&'static str),
    /// Returns one pose too few.
    Misaligned,
    Delayed(Duration),
    Panic,
}

/// Vision engine double: detections and solve outcomes are queued by the test.
#[derive(Default)]
pub struct ScriptedEngine {
    loading_checks: AtomicU32,
    detections: Mutex<VecDeque<Result<DetectionResult, DetectError>>>,
    solves: Mutex<VecDeque<SolveScript>>,
    solve_calls: Mutex<Vec<usize>>,
    solve_inputs: Mutex<Vec<Vec<u32>>>,
    detect_calls: AtomicUsize,
    detect_panics: AtomicU32,
    overlay_panics: AtomicU32,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report `Loading` for the next `checks` readiness queries.
    pub fn loading_for(checks: u32) -> Arc<Self> {
        let engine = Self::default();
        engine.loading_checks.store(checks, Ordering::SeqCst);
        Arc::new(engine)
    }

    pub fn push_detection(&self, detection: DetectionResult) {
        self.push_detect_result(Ok(detection));
    }

    pub fn push_detect_result(&self, result: Result<DetectionResult, DetectError>) {
        self.detections
            .lock()
            .expect("detections lock")
            .push_back(result);
    }

    pub fn push_solve(&self, script: SolveScript) {
        self.solves.lock().expect("solves lock").push_back(script);
    }

    /// Panic inside the next `times` detection calls.
    pub fn panic_on_detect(&self, times: u32) {
        self.detect_panics.store(times, Ordering::SeqCst);
    }

    /// Panic inside the next `times` overlay calls.
    pub fn panic_on_overlay(&self, times: u32) {
        self.overlay_panics.store(times, Ordering::SeqCst);
    }

    /// Leading corner id of each sample, per solve call, in the order received.
    pub fn solve_inputs(&self) -> Vec<Vec<u32>> {
        self.solve_inputs.lock().expect("solve inputs lock").clone()
    }

    /// Sample counts passed to every solve call so far.
    pub fn solve_calls(&self) -> Vec<usize> {
        self.solve_calls.lock().expect("solve calls lock").clone()
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

impl VisionEngine for ScriptedEngine {
    fn readiness(&self) -> EngineStatus {
        let remaining = self.loading_checks.load(Ordering::SeqCst);
        if remaining == 0 {
            return EngineStatus::Ready;
        }
        if remaining != u32::MAX {
            self.loading_checks.store(remaining - 1, Ordering::SeqCst);
        }
        EngineStatus::Loading
    }

    fn detect_board(&self, _frame: &Frame) -> Result<DetectionResult, DetectError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.detect_panics) {
            panic!("detector crashed");
        }
        self.detections
            .lock()
            .expect("detections lock")
            .pop_front()
            .unwrap_or(Ok(DetectionResult::NoBoard))
    }

    fn solve_calibration(
        &self,
        samples: &[Arc<Sample>],
        frame_size: FrameSize,
    ) -> Result<CalibrationResult, SolveError> {
        assert_eq!(frame_size, FrameSize::new(FRAME_W, FRAME_H));
        self.solve_calls
            .lock()
            .expect("solve calls lock")
            .push(samples.len());
        self.solve_inputs
            .lock()
            .expect("solve inputs lock")
            .push(samples.iter().map(|s| leading_id(s)).collect());
        let script = self
            .solves
            .lock()
            .expect("solves lock")
            .pop_front()
            .unwrap_or(SolveScript::Succeed {
                reprojection_error: 0.5,
            });
        match script {
            SolveScript::Succeed { reprojection_error } => {
                Ok(calibration_for(samples, reprojection_error))
            }
            SolveScript::Fail(reason) => Err(SolveError::insufficient(reason)),
            SolveScript::Misaligned => Ok(calibration(samples.len().saturating_sub(1), 0.5)),
            SolveScript::Delayed(delay) => {
                std::thread::sleep(delay);
                Ok(calibration_for(samples, 0.5))
            }
            SolveScript::Panic => panic!("solver crashed"),
        }
    }

    fn render_overlay(&self, frame: &Frame, _detection: &DetectionResult) -> RgbaImage {
        if take_one(&self.overlay_panics) {
            panic!("overlay renderer crashed");
        }
        frame.image().clone()
    }

    /// Left half black, right half white.
    fn render_board_image(&self, side: u32) -> GrayImage {
        GrayImage::from_fn(side, side, |x, _| {
            if x < side / 2 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }
}

/// Decrement a pending-failure counter; true when one was pending.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn leading_id(sample: &Sample) -> u32 {
    sample.ids().first().copied().unwrap_or(u32::MAX)
}

#[derive(Default)]
struct SourceScript {
    statuses: VecDeque<DeviceStatus>,
    frames: VecDeque<FramePoll>,
    releases: usize,
}

/// Frame source double. Clones share one script.
///
/// With nothing queued the device is ready and every poll yields a frame.
#[derive(Clone, Default)]
pub struct ScriptedSource(Arc<Mutex<SourceScript>>);

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: DeviceStatus) {
        self.0.lock().expect("source lock").statuses.push_back(status);
    }

    pub fn push_frame(&self, frame: FramePoll) {
        self.0.lock().expect("source lock").frames.push_back(frame);
    }

    pub fn releases(&self) -> usize {
        self.0.lock().expect("source lock").releases
    }
}

impl FrameSource for ScriptedSource {
    fn poll_device(&mut self) -> DeviceStatus {
        self.0
            .lock()
            .expect("source lock")
            .statuses
            .pop_front()
            .unwrap_or(DeviceStatus::Ready)
    }

    fn current_frame(&mut self) -> FramePoll {
        self.0
            .lock()
            .expect("source lock")
            .frames
            .pop_front()
            .unwrap_or_else(|| FramePoll::Ready(frame(0)))
    }

    fn release(&mut self) {
        self.0.lock().expect("source lock").releases += 1;
    }
}

pub fn frame(shade: u8) -> Frame {
    Frame::new(RgbaImage::from_pixel(
        FRAME_W,
        FRAME_H,
        Rgba([shade, shade, shade, 255]),
    ))
}

/// Refined detection with `n` corners and ids `0..n`.
pub fn refined(n: u32) -> DetectionResult {
    DetectionResult::RefinedCorners {
        corners: (0..n)
            .map(|i| Point2::new(4.0 + i as f32, 5.0 + i as f32))
            .collect(),
        ids: (0..n).collect(),
    }
}

/// Refined detection with `n` corners and ids `first..first + n`.
pub fn refined_from(first: u32, n: u32) -> DetectionResult {
    DetectionResult::RefinedCorners {
        corners: (0..n)
            .map(|i| Point2::new(4.0 + i as f32, 5.0 + i as f32))
            .collect(),
        ids: (first..first + n).collect(),
    }
}

pub fn markers_only() -> DetectionResult {
    DetectionResult::MarkersOnly {
        markers: vec![MarkerObservation {
            id: 3,
            corners: [
                Point2::new(1.0, 1.0),
                Point2::new(5.0, 1.0),
                Point2::new(5.0, 5.0),
                Point2::new(1.0, 5.0),
            ],
        }],
    }
}

/// Aligned calibration over `poses` samples.
pub fn calibration(poses: usize, reprojection_error: f64) -> CalibrationResult {
    CalibrationResult {
        reprojection_error,
        intrinsics: Matrix3::new(
            90.0,
            0.0,
            FRAME_W as f64 / 2.0,
            0.0,
            91.0,
            FRAME_H as f64 / 2.0,
            0.0,
            0.0,
            1.0,
        ),
        distortion: DistortionCoefficients([0.01, -0.002, 0.0, 0.0, 0.0]),
        rotation_vectors: (0..poses)
            .map(|i| Vector3::new(i as f64 * 0.1, 0.0, 0.0))
            .collect(),
        translation_vectors: (0..poses)
            .map(|i| Vector3::new(0.0, 0.0, 0.5 + i as f64 * 0.01))
            .collect(),
    }
}

/// Aligned calibration whose pose `i` carries the leading corner id of
/// `samples[i]` in its rotation x component.
pub fn calibration_for(samples: &[Arc<Sample>], reprojection_error: f64) -> CalibrationResult {
    let mut result = calibration(samples.len(), reprojection_error);
    for (rvec, sample) in result.rotation_vectors.iter_mut().zip(samples) {
        rvec.x = leading_id(sample) as f64;
    }
    result
}
