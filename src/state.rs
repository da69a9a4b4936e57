//! Shared activity state.
//!
//! A single process-wide boolean: "is the monitored object currently
//! moving?". The accelerometer alarm observer owns the only writer; every
//! sensor poller reads it to pick its sampling cadence. The writer half is
//! deliberately not `Clone`, so the single-writer contract is carried by the
//! type system rather than by convention.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Create a fresh activity state pair. Starts out not moving.
pub fn motion_state() -> (MotionWriter, MotionReader) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        MotionWriter { flag: flag.clone() },
        MotionReader { flag },
    )
}

/// Writer half, owned by the motion alarm observer.
#[derive(Debug)]
pub struct MotionWriter {
    flag: Arc<AtomicBool>,
}

impl MotionWriter {
    pub fn set(&self, moving: bool) {
        self.flag.store(moving, Ordering::SeqCst);
    }
}

/// Reader half, cloned into every sensor poller.
#[derive(Debug, Clone)]
pub struct MotionReader {
    flag: Arc<AtomicBool>,
}

impl MotionReader {
    pub fn is_moving(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
