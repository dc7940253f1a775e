//! Endpoint-crossing scheduler
//!
//! The scheduler projects the playhead trajectory over a fixed lookahead
//! horizon, prefetches the cues whose intervals touch the reachable position
//! window, and queues one entry per projected endpoint crossing. A single
//! cancellable timeout is armed for the queue head; on fire, every entry due
//! at or before the clock is delivered to subscribers in one batch, ordered
//! by `(due time, endpoint order)`. When the queue runs dry while the
//! playhead is still moving, the scheduler refills itself by re-anchoring the
//! current vector.
//!
//! `set_vector` always cancels the pending timeout before arming a new one;
//! a cancelled timeout never fires.

use crate::axis::{Axis, CueData, CueKey};
use crate::clock::{Clock, TimeoutHandle};
use crate::emitter::{CallbackHandle, Emitter};
use cf_core::{Cue, Endpoint, Interval, MotionVector};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Prefetch horizon in seconds
    pub lookahead: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { lookahead: 5.0 }
    }
}

/// Timer-cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No pending timeout
    Idle,
    /// Timeout armed for the next due entry or refill
    Armed,
    /// Currently delivering a due batch
    Firing,
}

/// One projected endpoint crossing
#[derive(Debug, Clone)]
pub struct DueCue<K, D> {
    /// Clock time the crossing is due at
    pub due: f64,
    /// The endpoint being crossed
    pub endpoint: Endpoint,
    /// The cue the endpoint belongs to
    pub cue: Cue<K, D>,
    /// Direction of travel at the crossing: -1 or +1
    pub direction: i8,
}

struct SchedulerInner<K, D> {
    vector: Option<MotionVector>,
    window: Option<(f64, f64)>,
    queue: Vec<DueCue<K, D>>,
    timeout: Option<TimeoutHandle>,
    state: SchedulerState,
}

struct SchedulerShared<K, D> {
    axis: Arc<Axis<K, D>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    emitter: Emitter<Vec<DueCue<K, D>>>,
    inner: Mutex<SchedulerInner<K, D>>,
}

/// Windowed prefetch and timed dispatch of endpoint crossings
pub struct Scheduler<K, D> {
    shared: Arc<SchedulerShared<K, D>>,
}

impl<K: CueKey, D: CueData> Scheduler<K, D> {
    pub fn new(axis: Arc<Axis<K, D>>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                axis,
                clock,
                config,
                emitter: Emitter::new(),
                inner: Mutex::new(SchedulerInner {
                    vector: None,
                    window: None,
                    queue: Vec::new(),
                    timeout: None,
                    state: SchedulerState::Idle,
                }),
            }),
        }
    }

    /// Reprogram the scheduler for a new motion vector
    pub fn set_vector(&self, vector: MotionVector) {
        let now = self.shared.clock.now();
        let mut inner = self.shared.inner.lock();
        SchedulerShared::reschedule(&self.shared, &mut inner, vector, now);
    }

    /// Subscribe to due batches
    pub fn add_callback(
        &self,
        callback: impl Fn(&Vec<DueCue<K, D>>) + Send + Sync + 'static,
    ) -> CallbackHandle {
        self.shared.emitter.add_callback(callback)
    }

    pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
        self.shared.emitter.remove_callback(handle)
    }

    pub fn vector(&self) -> Option<MotionVector> {
        self.shared.inner.lock().vector
    }

    /// Current prefetch position window, when armed
    pub fn window(&self) -> Option<(f64, f64)> {
        self.shared.inner.lock().window
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.inner.lock().state
    }

    /// Queued crossings not yet delivered
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }
}

impl<K, D> Drop for Scheduler<K, D> {
    fn drop(&mut self) {
        if let Some(timeout) = self.shared.inner.lock().timeout.take() {
            timeout.cancel();
        }
    }
}

impl<K: CueKey, D: CueData> SchedulerShared<K, D> {
    /// Reachable position envelope over `[v.timestamp, v.timestamp + lookahead]`
    fn position_window(vector: &MotionVector, lookahead: f64) -> (f64, f64) {
        let t0 = vector.timestamp;
        let t1 = t0 + lookahead;
        let p0 = vector.position;
        let p1 = vector.position_at(t1);
        let mut lo = p0.min(p1);
        let mut hi = p0.max(p1);
        // Acceleration against velocity puts a trajectory extremum inside
        // the horizon
        if vector.acceleration != 0.0 {
            let t_ext = t0 - vector.velocity / vector.acceleration;
            if t_ext > t0 && t_ext < t1 {
                let p_ext = vector.position_at(t_ext);
                lo = lo.min(p_ext);
                hi = hi.max(p_ext);
            }
        }
        (lo, hi)
    }

    fn reschedule(
        shared: &Arc<Self>,
        inner: &mut SchedulerInner<K, D>,
        vector: MotionVector,
        now: f64,
    ) {
        if let Some(timeout) = inner.timeout.take() {
            timeout.cancel();
        }
        inner.vector = Some(vector);

        let lookahead = shared.config.lookahead;
        let (lo, hi) = Self::position_window(&vector, lookahead);
        inner.window = Some((lo, hi));

        let mut queue: Vec<DueCue<K, D>> = Vec::new();
        if let Ok(window) = Interval::closed(lo, hi) {
            for cue in shared.axis.lookup(&window) {
                for endpoint in cue.interval.endpoints() {
                    for dt in vector.crossing_times(endpoint.value) {
                        let due = vector.timestamp + dt;
                        if due < now || due > now + lookahead {
                            continue;
                        }
                        let direction = vector.direction_at(due);
                        if direction != 0 {
                            queue.push(DueCue {
                                due,
                                endpoint,
                                cue: cue.clone(),
                                direction,
                            });
                        }
                    }
                }
            }
        }
        queue.sort_by(|a, b| {
            a.due
                .total_cmp(&b.due)
                .then_with(|| a.endpoint.cmp_order(&b.endpoint))
        });
        log::debug!(
            "scheduler window [{lo}, {hi}], {} crossing(s) queued",
            queue.len()
        );
        inner.queue = queue;
        Self::arm(shared, inner, now);
    }

    fn arm(shared: &Arc<Self>, inner: &mut SchedulerInner<K, D>, now: f64) {
        let delay = match inner.queue.first() {
            Some(head) => Some((head.due - now).max(0.0)),
            // Empty queue: schedule a refill at the horizon while moving
            None if inner.vector.map(|v| v.is_moving()).unwrap_or(false) => {
                Some(shared.config.lookahead)
            }
            None => None,
        };
        match delay {
            Some(delay) => {
                let weak = Arc::downgrade(shared);
                inner.timeout = Some(shared.clock.set_timeout(
                    delay,
                    Box::new(move || Self::on_timeout(&weak)),
                ));
                inner.state = SchedulerState::Armed;
            }
            None => {
                inner.state = SchedulerState::Idle;
            }
        }
    }

    fn on_timeout(weak: &Weak<Self>) {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let now = shared.clock.now();

        let batch: Vec<DueCue<K, D>> = {
            let mut inner = shared.inner.lock();
            inner.timeout = None;
            inner.state = SchedulerState::Firing;
            let due_count = inner.queue.partition_point(|entry| entry.due <= now);
            inner.queue.drain(..due_count).collect()
        };

        if !batch.is_empty() {
            log::debug!("scheduler firing {} due entries at {now}", batch.len());
            shared.emitter.emit(&batch);
        }

        let mut inner = shared.inner.lock();
        if inner.state != SchedulerState::Firing {
            // A subscriber rescheduled during dispatch; it owns the timer now
            return;
        }
        if inner.queue.is_empty() {
            match inner.vector {
                Some(v) if v.is_moving() => {
                    let reanchored = v.at(now);
                    Self::reschedule(&shared, &mut inner, reanchored, now);
                }
                _ => {
                    inner.state = SchedulerState::Idle;
                }
            }
        } else {
            Self::arm(&shared, &mut inner, now);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisOp;
    use crate::clock::ManualClock;

    fn iv(low: f64, high: f64) -> Interval {
        Interval::closed(low, high).unwrap()
    }

    fn fixture() -> (Arc<Axis<&'static str, u32>>, Arc<ManualClock>) {
        let axis = Arc::new(Axis::new());
        axis.update(vec![
            AxisOp::put("a", iv(0.0, 10.0), 0),
            AxisOp::put("b", iv(5.0, 15.0), 0),
            AxisOp::put("c", iv(20.0, 30.0), 0),
        ]);
        (axis, Arc::new(ManualClock::new()))
    }

    fn collect_batches(
        scheduler: &Scheduler<&'static str, u32>,
    ) -> Arc<Mutex<Vec<Vec<(f64, &'static str, f64)>>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        scheduler.add_callback(move |batch| {
            sink.lock().push(
                batch
                    .iter()
                    .map(|d| (d.due, d.cue.key, d.endpoint.value))
                    .collect(),
            );
        });
        batches
    }

    #[test]
    fn test_window_soundness() {
        let (axis, clock) = fixture();
        let scheduler = Scheduler::new(axis, clock, SchedulerConfig::default());

        // Forward motion from 0: every crossing due within 5s is queued
        scheduler.set_vector(MotionVector::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        assert_eq!(scheduler.window(), Some((0.0, 5.0)));
        // b.low at t=5 is in the horizon; a.low at t=0 is not a future crossing
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_fire_and_refill() {
        let (axis, clock) = fixture();
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        scheduler.set_vector(MotionVector::new(0.0, 1.0, 0.0, 0.0));
        clock.advance(21.0);

        let batches = batches.lock();
        let flat: Vec<(f64, &str, f64)> = batches.iter().flatten().copied().collect();
        assert_eq!(
            flat,
            vec![
                (5.0, "b", 5.0),
                (10.0, "a", 10.0),
                (15.0, "b", 15.0),
                (20.0, "c", 20.0),
            ]
        );
    }

    #[test]
    fn test_set_vector_cancels_pending() {
        let (axis, clock) = fixture();
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        scheduler.set_vector(MotionVector::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(scheduler.pending(), 1);

        // Stop before b.low is reached: the pending crossing must die
        scheduler.set_vector(MotionVector::stationary(3.0, 3.0));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.pending(), 0);

        clock.advance(30.0);
        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_backward_motion() {
        let (axis, clock) = fixture();
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        // Backward from 12: crosses b.high=15? No: moving down from 12,
        // crosses a.high=10 at t=2, b.low=5 at t=7 (outside first window)
        scheduler.set_vector(MotionVector::new(12.0, -1.0, 0.0, 0.0));
        assert_eq!(scheduler.window(), Some((7.0, 12.0)));
        clock.advance(8.0);

        let flat: Vec<(f64, &str, f64)> = batches.lock().iter().flatten().copied().collect();
        assert_eq!(flat, vec![(2.0, "a", 10.0), (7.0, "b", 5.0)]);
    }

    #[test]
    fn test_simultaneous_crossings_one_batch() {
        let axis: Arc<Axis<&str, u32>> = Arc::new(Axis::new());
        // Two cues sharing the boundary at 5: "x" ends where "y" begins
        axis.update(vec![
            AxisOp::put("x", iv(0.0, 5.0), 0),
            AxisOp::put("y", iv(5.0, 9.0), 0),
        ]);
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        scheduler.set_vector(MotionVector::new(0.0, 1.0, 0.0, 0.0));
        clock.advance(5.0);

        let batches = batches.lock();
        // One batch carrying both simultaneous crossings; the closed
        // endpoints share a rank, so the stable sort keeps key order
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].0, 5.0);
        assert_eq!(batches[0][1].0, 5.0);
    }

    #[test]
    fn test_refill_when_no_endpoints_near() {
        let axis: Arc<Axis<&str, u32>> = Arc::new(Axis::new());
        axis.update(vec![AxisOp::put("far", iv(100.0, 110.0), 0)]);
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        scheduler.set_vector(MotionVector::new(0.0, 10.0, 0.0, 0.0));
        // Window [0,50] holds no cue; refill at the horizon finds "far"
        clock.advance(12.0);

        let flat: Vec<(f64, &str, f64)> = batches.lock().iter().flatten().copied().collect();
        assert_eq!(flat, vec![(10.0, "far", 100.0), (11.0, "far", 110.0)]);
    }

    #[test]
    fn test_deceleration_double_crossing() {
        let axis: Arc<Axis<&str, u32>> = Arc::new(Axis::new());
        axis.update(vec![AxisOp::put("edge", iv(3.0, 50.0), 0)]);
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(axis, Arc::clone(&clock) as Arc<dyn Clock>, SchedulerConfig::default());
        let batches = collect_batches(&scheduler);

        // Up through 3 at t=1, reverse at t=2 (peak 4), back through 3 at t=3
        scheduler.set_vector(MotionVector::new(0.0, 4.0, -2.0, 0.0));
        clock.advance(4.0);

        let flat: Vec<(f64, &str, f64)> = batches.lock().iter().flatten().copied().collect();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0], (1.0, "edge", 3.0));
        assert_eq!(flat[1], (3.0, "edge", 3.0));
    }
}
