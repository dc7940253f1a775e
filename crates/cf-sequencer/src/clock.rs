//! Clocks and cancellable timeouts
//!
//! The scheduler never sleeps; it asks its clock for one cancellable timeout
//! at a time. `ManualClock` is deterministic and host-stepped, which is what
//! every test drives. `SystemClock` parks a thread per timeout on a channel
//! so cancellation wakes and retires it immediately instead of busy-waiting.
//!
//! A cancelled timeout never fires. Dropping a handle without cancelling does
//! not cancel; the timeout still fires.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked when a timeout elapses
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Monotonic clock with cancellable one-shot timeouts
pub trait Clock: Send + Sync {
    /// Current clock time in seconds
    fn now(&self) -> f64;

    /// Arrange for `callback` to run `delay` seconds from now
    fn set_timeout(&self, delay: f64, callback: TimerCallback) -> TimeoutHandle;
}

/// Handle to a pending timeout
pub struct TimeoutHandle {
    cancelled: Arc<AtomicBool>,
    waker: Option<Sender<()>>,
}

impl TimeoutHandle {
    /// Prevent the timeout from firing
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            let _ = waker.try_send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MANUAL CLOCK
// ═══════════════════════════════════════════════════════════════════════════

struct PendingTimeout {
    due: f64,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

struct ManualClockInner {
    now: f64,
    next_seq: u64,
    pending: Vec<PendingTimeout>,
}

/// Deterministic clock stepped by the host
///
/// `advance` fires due timeouts in `(due, registration)` order, outside the
/// internal lock, so callbacks may register further timeouts on the same
/// clock (the scheduler's refill path does exactly that).
pub struct ManualClock {
    inner: Mutex<ManualClockInner>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualClockInner {
                now: 0.0,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    /// Step the clock forward by `dt` seconds
    pub fn advance(&self, dt: f64) {
        let target = self.inner.lock().now + dt;
        self.advance_to(target);
    }

    /// Step the clock to absolute time `target`
    pub fn advance_to(&self, target: f64) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                inner.pending.retain(|p| !p.cancelled.load(Ordering::SeqCst));

                let idx = inner
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
                    .map(|(i, _)| i);

                match idx {
                    Some(i) => {
                        let p = inner.pending.swap_remove(i);
                        inner.now = inner.now.max(p.due);
                        Some(p)
                    }
                    None => {
                        inner.now = inner.now.max(target);
                        None
                    }
                }
            };
            match next {
                Some(p) => (p.callback)(),
                None => break,
            }
        }
    }

    /// Pending timeouts not yet cancelled (test aid)
    pub fn pending_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.pending.retain(|p| !p.cancelled.load(Ordering::SeqCst));
        inner.pending.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.inner.lock().now
    }

    fn set_timeout(&self, delay: f64, callback: TimerCallback) -> TimeoutHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let due = inner.now + delay.max(0.0);
        inner.pending.push(PendingTimeout {
            due,
            seq,
            cancelled: Arc::clone(&cancelled),
            callback,
        });
        TimeoutHandle {
            cancelled,
            waker: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SYSTEM CLOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Wall clock anchored at construction
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn set_timeout(&self, delay: f64, callback: TimerCallback) -> TimeoutHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<()>(1);
        let flag = Arc::clone(&cancelled);
        let deadline = Instant::now() + Duration::from_secs_f64(delay.max(0.0));

        std::thread::spawn(move || {
            loop {
                match rx.recv_deadline(deadline) {
                    // Explicit wake: cancelled
                    Ok(()) => return,
                    Err(RecvTimeoutError::Timeout) => break,
                    // Handle dropped without cancel: wait out the remainder
                    Err(RecvTimeoutError::Disconnected) => {
                        let rest = deadline.saturating_duration_since(Instant::now());
                        if !rest.is_zero() {
                            std::thread::sleep(rest);
                        }
                        break;
                    }
                }
            }
            if !flag.load(Ordering::SeqCst) {
                callback();
            }
        });

        TimeoutHandle {
            cancelled,
            waker: Some(tx),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_fires_in_due_order() {
        let clock = ManualClock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [("b", 2.0), ("a", 1.0), ("c", 3.0)] {
            let o = Arc::clone(&order);
            clock.set_timeout(delay, Box::new(move || o.lock().push(label)));
        }

        clock.advance(2.5);
        assert_eq!(order.lock().as_slice(), &["a", "b"]);
        assert_eq!(clock.pending_count(), 1);

        clock.advance(1.0);
        assert_eq!(order.lock().as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn test_manual_cancel() {
        let clock = ManualClock::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let handle = clock.set_timeout(
            1.0,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        assert!(handle.is_cancelled());

        clock.advance(5.0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_callback_registers_timeout() {
        let clock = Arc::new(ManualClock::new());
        let count = Arc::new(AtomicUsize::new(0));

        let ck = Arc::clone(&clock);
        let c = Arc::clone(&count);
        clock.set_timeout(
            1.0,
            Box::new(move || {
                let c2 = Arc::clone(&c);
                ck.set_timeout(
                    1.0,
                    Box::new(move || {
                        c2.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        // One advance covers the chained timeout too
        clock.advance(3.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_manual_now_tracks_due_times() {
        let clock = ManualClock::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        // now() observed from inside a callback equals the due time
        let clock = Arc::new(clock);
        let ck = Arc::clone(&clock);
        let s = Arc::clone(&seen);
        clock.set_timeout(1.5, Box::new(move || s.lock().push(ck.now())));

        clock.advance(4.0);
        assert_eq!(seen.lock().as_slice(), &[1.5]);
        assert_eq!(clock.now(), 4.0);
    }

    #[test]
    fn test_system_clock_fires() {
        let clock = SystemClock::new();
        let (tx, rx) = bounded::<f64>(1);

        clock.set_timeout(
            0.01,
            Box::new(move || {
                let _ = tx.send(1.0);
            }),
        );
        let fired = rx.recv_timeout(Duration::from_secs(2));
        assert!(fired.is_ok());
    }

    #[test]
    fn test_system_clock_cancel() {
        let clock = SystemClock::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let handle = clock.set_timeout(
            0.05,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
