use std::sync::{Arc, Mutex, PoisonError};

use super::frame::Frame;

/// Holds the latest frame. Readers take an `Arc` snapshot so a frame stored
/// while a batch is running never changes the frame that batch works on.
#[derive(Debug, Default)]
pub struct FrameCache {
    latest: Mutex<Option<Arc<Frame>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached frame and returns the previous one.
    pub fn store(&self, frame: Frame) -> Option<Arc<Frame>> {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.replace(Arc::new(frame))
    }

    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
