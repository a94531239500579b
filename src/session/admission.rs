//! Admission control
//!
//! Caps the number of concurrently running sessions. The counter is the only
//! state shared between sessions and is only touched through atomics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Process-wide gate on concurrent sessions
#[derive(Debug)]
pub struct AdmissionController {
    active: AtomicUsize,
    max: usize,
}

impl AdmissionController {
    /// Create a controller admitting at most `max` concurrent sessions
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a session slot.
    ///
    /// Returns `None` when the gateway is full. The returned permit releases
    /// the slot when dropped.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let admitted = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        if admitted > self.max {
            self.release();
            debug!("Admission refused, all {} slots in use", self.max);
            return None;
        }
        Some(AdmissionPermit {
            controller: Arc::clone(self),
        })
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of slots currently reserved
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Configured maximum
    pub fn max(&self) -> usize {
        self.max
    }
}

/// A reserved session slot
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max() {
        let controller = Arc::new(AdmissionController::new(2));
        let first = controller.try_admit();
        let second = controller.try_admit();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(controller.active(), 2);

        assert!(controller.try_admit().is_none());
        assert_eq!(controller.active(), 2);
    }

    #[test]
    fn test_drop_releases_slot() {
        let controller = Arc::new(AdmissionController::new(1));
        let permit = controller.try_admit().unwrap();
        assert!(controller.try_admit().is_none());

        drop(permit);
        assert_eq!(controller.active(), 0);
        assert!(controller.try_admit().is_some());
    }

    #[test]
    fn test_zero_max_refuses_everything() {
        let controller = Arc::new(AdmissionController::new(0));
        assert!(controller.try_admit().is_none());
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn test_concurrent_admissions_never_leak() {
        let controller = Arc::new(AdmissionController::new(8));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(permit) = controller.try_admit() {
                            assert!(controller.active() <= 16);
                            drop(permit);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn test_admitted_count_never_exceeds_max() {
        let controller = Arc::new(AdmissionController::new(4));
        let permits: Vec<_> = (0..10).filter_map(|_| controller.try_admit()).collect();
        assert_eq!(permits.len(), 4);
        assert_eq!(controller.max(), 4);
    }
}
