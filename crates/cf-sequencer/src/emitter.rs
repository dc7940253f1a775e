//! Event emitter capability
//!
//! Each component that publishes events owns one `Emitter` field and
//! delegates to it. Dispatch snapshots the subscriber list first, so a
//! subscription added from inside a callback takes effect on the next event,
//! and a panicking subscriber is isolated from the others.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by `add_callback`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Subscriber registry for one event type
pub struct Emitter<E> {
    subscribers: Mutex<Vec<(CallbackHandle, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber
    pub fn add_callback(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> CallbackHandle {
        self.add_boxed(Box::new(callback))
    }

    /// Register a boxed subscriber (object-safe form)
    pub fn add_boxed(&self, callback: Box<dyn Fn(&E) + Send + Sync>) -> CallbackHandle {
        let handle = CallbackHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((handle, Arc::from(callback)));
        handle
    }

    /// Unsubscribe; returns false when the handle is unknown
    pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(h, _)| *h != handle);
        subs.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Dispatch `event` to every subscriber registered at call time.
    ///
    /// A subscriber that panics is logged and skipped; the rest still run.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                log::error!("event subscriber panicked; continuing with remaining subscribers");
            }
        }
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
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
    fn test_add_remove() {
        let emitter: Emitter<u32> = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let handle = emitter.add_callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(emitter.remove_callback(handle));
        assert!(!emitter.remove_callback(handle));
        emitter.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_isolation() {
        let emitter: Emitter<u32> = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        emitter.add_callback(|_| panic!("bad subscriber"));
        let c = Arc::clone(&count);
        emitter.add_callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let emitter: Arc<Emitter<u32>> = Arc::new(Emitter::new());
        let count = Arc::new(AtomicUsize::new(0));

        let em = Arc::clone(&emitter);
        let c = Arc::clone(&count);
        emitter.add_callback(move |_| {
            let c2 = Arc::clone(&c);
            em.add_callback(move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
            });
        });

        // The nested subscription must not see the event that created it
        emitter.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        emitter.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
