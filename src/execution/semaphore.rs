use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore.
///
/// Used to bound in-flight ingestions so a burst of arrivals backs up into the event channel
/// instead of piling onto the worker pool.
pub struct Semaphore {
    capacity: usize,
    permits: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "permits must be > 0");
        Self {
            capacity: permits,
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until available.
    ///
    /// Returns the time spent waiting (zero if no wait was required).
    pub fn acquire(&self) -> Duration {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        if waited { start.elapsed() } else { Duration::ZERO }
    }

    /// Release one permit.
    pub fn release(&self) {
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *g += 1;
        self.cv.notify_all();
    }

    /// Block until every permit has been returned.
    pub fn wait_idle(&self) {
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *g < self.capacity {
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - *self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns its permit when dropped, including while unwinding.
pub struct Permit<'a>(pub &'a Semaphore);

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
