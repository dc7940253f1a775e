//! Timing source interface and the in-process provider
//!
//! The sequencer consumes motion through the small `Timing` interface: the
//! current and previous vectors, a clock, the reachable position range, a
//! readiness flag, and change notifications. `InternalTiming` is the
//! in-process implementation: push vectors at it and it validates, clamps,
//! latches readiness on the first update, and notifies subscribers.

use crate::clock::Clock;
use crate::emitter::{CallbackHandle, Emitter};
use cf_core::{CfResult, MotionVector};
use parking_lot::RwLock;
use std::sync::Arc;

/// Payload of a timing `change` notification
#[derive(Debug, Clone, Copy)]
pub struct TimingChange {
    /// True on the readiness transition (first vector published)
    pub init: bool,
}

/// Motion source consumed by the sequencer
pub trait Timing: Send + Sync {
    /// Current motion vector; `None` before the source is ready
    fn vector(&self) -> Option<MotionVector>;

    /// Vector preceding the current one, when there was one
    fn old_vector(&self) -> Option<MotionVector>;

    /// The clock this source's timestamps are anchored to
    fn clock(&self) -> Arc<dyn Clock>;

    /// Bounds on reachable axis positions
    fn range(&self) -> (f64, f64);

    fn is_ready(&self) -> bool;

    /// Subscribe to vector changes (boxed: keeps the trait object-safe)
    fn add_callback(&self, callback: Box<dyn Fn(&TimingChange) + Send + Sync>) -> CallbackHandle;

    fn remove_callback(&self, handle: CallbackHandle) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════
// INTERNAL TIMING PROVIDER
// ═══════════════════════════════════════════════════════════════════════════

struct TimingState {
    vector: Option<MotionVector>,
    old_vector: Option<MotionVector>,
}

/// In-process timing provider
pub struct InternalTiming {
    clock: Arc<dyn Clock>,
    range: (f64, f64),
    state: RwLock<TimingState>,
    emitter: Emitter<TimingChange>,
}

impl InternalTiming {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_range(clock, (f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Provider with a bounded position range; updates are clamped into it
    pub fn with_range(clock: Arc<dyn Clock>, range: (f64, f64)) -> Self {
        Self {
            clock,
            range,
            state: RwLock::new(TimingState {
                vector: None,
                old_vector: None,
            }),
            emitter: Emitter::new(),
        }
    }

    /// Publish a new motion vector.
    ///
    /// The vector must be finite; its position is clamped into the range.
    /// The first successful update latches readiness and notifies with
    /// `init: true`.
    pub fn update(&self, vector: MotionVector) -> CfResult<()> {
        vector.validate()?;
        let mut vector = vector;
        vector.position = vector.position.clamp(self.range.0, self.range.1);

        let init = {
            let mut state = self.state.write();
            let init = state.vector.is_none();
            state.old_vector = state.vector.replace(vector);
            init
        };

        if init {
            log::debug!("timing ready, initial vector {vector:?}");
        }
        self.emitter.emit(&TimingChange { init });
        Ok(())
    }
}

impl Timing for InternalTiming {
    fn vector(&self) -> Option<MotionVector> {
        self.state.read().vector
    }

    fn old_vector(&self) -> Option<MotionVector> {
        self.state.read().old_vector
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn range(&self) -> (f64, f64) {
        self.range
    }

    fn is_ready(&self) -> bool {
        self.state.read().vector.is_some()
    }

    fn add_callback(&self, callback: Box<dyn Fn(&TimingChange) + Send + Sync>) -> CallbackHandle {
        self.emitter.add_boxed(callback)
    }

    fn remove_callback(&self, handle: CallbackHandle) -> bool {
        self.emitter.remove_callback(handle)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use cf_core::CfError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_readiness_latch() {
        let timing = InternalTiming::new(Arc::new(ManualClock::new()));
        assert!(!timing.is_ready());
        assert_eq!(timing.vector(), None);

        let inits = Arc::new(AtomicUsize::new(0));
        let changes = Arc::new(AtomicUsize::new(0));
        let i = Arc::clone(&inits);
        let c = Arc::clone(&changes);
        timing.add_callback(Box::new(move |change| {
            c.fetch_add(1, Ordering::SeqCst);
            if change.init {
                i.fetch_add(1, Ordering::SeqCst);
            }
        }));

        timing.update(MotionVector::stationary(0.0, 0.0)).unwrap();
        assert!(timing.is_ready());
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        timing
            .update(MotionVector::new(0.0, 1.0, 0.0, 1.0))
            .unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
        assert_eq!(timing.old_vector(), Some(MotionVector::stationary(0.0, 0.0)));
    }

    #[test]
    fn test_rejects_non_finite() {
        let timing = InternalTiming::new(Arc::new(ManualClock::new()));
        let err = timing
            .update(MotionVector::new(f64::NAN, 0.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, CfError::InvalidVector(_)));
        assert!(!timing.is_ready());
    }

    #[test]
    fn test_range_clamp() {
        let clock = Arc::new(ManualClock::new());
        let timing = InternalTiming::with_range(clock, (0.0, 100.0));
        timing
            .update(MotionVector::stationary(250.0, 0.0))
            .unwrap();
        assert_eq!(timing.vector().unwrap().position, 100.0);
    }
}
