//! Frame source adapter seam (the live capture device).

use crate::frame::Frame;

/// Readiness of the physical capture device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Ready,
    /// Still opening (permission prompt, driver warm-up, ...).
    Pending,
    /// The device reported a failure; the session keeps waiting.
    Failed(String),
}

/// Result of pulling the current frame.
#[derive(Clone, Debug)]
pub enum FramePoll {
    Ready(Frame),
    NotReady,
}

/// Pull-based camera frame supplier. Implementations must never block.
pub trait FrameSource: Send {
    fn poll_device(&mut self) -> DeviceStatus;

    fn current_frame(&mut self) -> FramePoll;

    /// Release the device when the session resets or finishes.
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn poll_device(&mut self) -> DeviceStatus {
        (**self).poll_device()
    }

    fn current_frame(&mut self) -> FramePoll {
        (**self).current_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
