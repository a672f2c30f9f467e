//! Ordered sample storage with snapshot/restore.

use std::sync::Arc;

use calib_capture_core::{FrameSize, Sample, Thumbnail};

/// Accepted samples in capture order, plus the frame size of the first one.
///
/// Only the last element can be added or removed. Samples are shared through
/// `Arc`, so snapshots and solve jobs copy pointers, not images.
#[derive(Clone, Debug, Default)]
pub struct SampleStore {
    samples: Vec<Arc<Sample>>,
    frame_size: Option<FrameSize>,
}

/// Copy of a [`SampleStore`] taken before a mutation that may be undone.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreSnapshot {
    samples: Vec<Arc<Sample>>,
    frame_size: Option<FrameSize>,
}

impl StoreSnapshot {
    #[inline]
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame size of the first accepted sample; fixed for the session.
    #[inline]
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.frame_size
    }

    /// Append a sample. `frame_size` is recorded only for the first one.
    ///
    /// Returns the index of the new sample.
    pub fn append(&mut self, sample: Sample, frame_size: FrameSize) -> usize {
        if self.frame_size.is_none() {
            self.frame_size = Some(frame_size);
        } else if self.frame_size != Some(frame_size) {
            log::debug!(
                "sample frame size {frame_size} differs from session frame size {}",
                self.frame_size.map(|s| s.to_string()).unwrap_or_default()
            );
        }
        self.samples.push(Arc::new(sample));
        self.samples.len() - 1
    }

    /// Remove the most recent sample. Frame size is left untouched.
    pub fn pop_last(&mut self) -> Option<Arc<Sample>> {
        self.samples.pop()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            samples: self.samples.clone(),
            frame_size: self.frame_size,
        }
    }

    /// Replace contents and frame size with the snapshot's.
    pub fn restore(&mut self, snapshot: &StoreSnapshot) {
        self.samples.clone_from(&snapshot.samples);
        self.frame_size = snapshot.frame_size;
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Arc<Sample>> + '_ {
        self.samples.iter()
    }

    /// Shared handles to all samples, in capture order.
    pub fn shared(&self) -> Vec<Arc<Sample>> {
        self.samples.clone()
    }

    pub fn thumbnails(&self) -> Vec<Thumbnail> {
        self.samples.iter().map(|s| s.thumbnail().clone()).collect()
    }

    /// True when `snapshot` still describes this store exactly.
    pub fn matches(&self, snapshot: &StoreSnapshot) -> bool {
        self.frame_size == snapshot.frame_size
            && self.samples.len() == snapshot.samples.len()
            && self
                .samples
                .iter()
                .zip(&snapshot.samples)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.frame_size = None;
    }
}
