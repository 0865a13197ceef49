//! Monotonic timestamps for delivered frames

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock shared by the handlers of one controller
///
/// All frame timestamps derive from this single source
/// to ensure monotonic ordering.
#[derive(Debug, Clone)]
pub struct CaptureClock {
    start: Arc<Instant>,
}

impl CaptureClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Microseconds elapsed since the clock was created
    #[inline]
    pub fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Time elapsed since `since`, saturating at zero
    #[inline]
    pub fn elapsed_since(&self, since: Instant) -> Duration {
        Instant::now().saturating_duration_since(since)
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}
