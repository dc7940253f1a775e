//! The sequencer: active-set maintenance over axis, timing, and schedule
//!
//! The sequencer folds three event sources into one stream of cue
//! transitions: axis batch updates, timing-source vector changes, and the
//! scheduler's due batches. Its invariant: a cue is active exactly when its
//! interval covers the playhead position under the current vector, lagging
//! real time by at most the timer resolution.
//!
//! Subscriptions into the axis, the timing source, and the scheduler hold
//! weak references back to the sequencer state, and `Drop` unsubscribes, so
//! the event sources never keep a dropped sequencer alive.

use crate::axis::{Axis, CueData, CueKey, DeltaKind, EventMap};
use crate::clock::Clock;
use crate::emitter::{CallbackHandle, Emitter};
use crate::schedule::{DueCue, Scheduler, SchedulerConfig};
use crate::timing::Timing;
use cf_core::{CfError, CfResult, Cue, MotionDelta, MoveDelta, PosDelta};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One cue transition
///
/// `new == None` is an exit, `old == None` an enter; both present is a
/// change of interval or payload while the cue stays active.
#[derive(Debug, Clone)]
pub struct CueChange<K, D> {
    pub key: K,
    pub new: Option<Cue<K, D>>,
    pub old: Option<Cue<K, D>>,
}

impl<K, D> CueChange<K, D> {
    pub fn is_enter(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    pub fn is_exit(&self) -> bool {
        self.new.is_none() && self.old.is_some()
    }

    pub fn is_change(&self) -> bool {
        self.new.is_some() && self.old.is_some()
    }
}

struct SequencerCore<K, D> {
    active: HashMap<K, Cue<K, D>>,
    ready: bool,
    ready_hooks: Vec<Box<dyn FnOnce() + Send>>,
}

struct SequencerShared<K, D> {
    axis: Arc<Axis<K, D>>,
    timing: Arc<dyn Timing>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler<K, D>,
    emitter: Emitter<Vec<CueChange<K, D>>>,
    core: Mutex<SequencerCore<K, D>>,
}

/// Active-cue sequencer over an axis and a timing source
pub struct Sequencer<K: CueKey, D: CueData> {
    shared: Arc<SequencerShared<K, D>>,
    axis_sub: CallbackHandle,
    timing_sub: CallbackHandle,
    scheduler_sub: CallbackHandle,
}

impl<K: CueKey, D: CueData> Sequencer<K, D> {
    pub fn new(axis: Arc<Axis<K, D>>, timing: Arc<dyn Timing>) -> Self {
        Self::with_config(axis, timing, SchedulerConfig::default())
    }

    pub fn with_config(
        axis: Arc<Axis<K, D>>,
        timing: Arc<dyn Timing>,
        config: SchedulerConfig,
    ) -> Self {
        let clock = timing.clock();
        let scheduler = Scheduler::new(Arc::clone(&axis), Arc::clone(&clock), config);

        let shared = Arc::new(SequencerShared {
            axis,
            timing,
            clock,
            scheduler,
            emitter: Emitter::new(),
            core: Mutex::new(SequencerCore {
                active: HashMap::new(),
                ready: false,
                ready_hooks: Vec::new(),
            }),
        });

        let weak = Arc::downgrade(&shared);
        let axis_sub = shared.axis.add_callback(move |events| {
            if let Some(shared) = weak.upgrade() {
                SequencerShared::on_axis_events(&shared, events);
            }
        });

        let weak = Arc::downgrade(&shared);
        let timing_sub = shared.timing.add_callback(Box::new(move |change| {
            if let Some(shared) = weak.upgrade() {
                SequencerShared::on_timing_change(&shared, change.init);
            }
        }));

        let weak = Arc::downgrade(&shared);
        let scheduler_sub = shared.scheduler.add_callback(move |batch| {
            if let Some(shared) = weak.upgrade() {
                SequencerShared::on_due_batch(&shared, batch);
            }
        });

        // Source already ready at construction: latch immediately
        if shared.timing.is_ready() {
            SequencerShared::on_timing_change(&shared, true);
        }

        Self {
            shared,
            axis_sub,
            timing_sub,
            scheduler_sub,
        }
    }

    /// Subscribe to cue transitions
    pub fn add_callback(
        &self,
        callback: impl Fn(&Vec<CueChange<K, D>>) + Send + Sync + 'static,
    ) -> CallbackHandle {
        self.shared.emitter.add_callback(callback)
    }

    pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
        self.shared.emitter.remove_callback(handle)
    }

    pub fn is_ready(&self) -> bool {
        self.shared.core.lock().ready
    }

    /// Run `hook` once the sequencer is ready; immediately when it already is
    pub fn on_ready(&self, hook: impl FnOnce() + Send + 'static) {
        let mut core = self.shared.core.lock();
        if core.ready {
            drop(core);
            hook();
        } else {
            core.ready_hooks.push(Box::new(hook));
        }
    }

    /// Current playhead position under the active vector
    pub fn position(&self) -> CfResult<f64> {
        let vector = self.shared.timing.vector().ok_or(CfError::NotReady)?;
        Ok(vector.position_at(self.shared.clock.now()))
    }

    /// The scheduler backing this sequencer (window and state introspection)
    pub fn scheduler(&self) -> &Scheduler<K, D> {
        &self.shared.scheduler
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MAP-LIKE ACCESSORS OVER THE ACTIVE SET
    // ═══════════════════════════════════════════════════════════════════════

    pub fn has(&self, key: &K) -> bool {
        self.shared.core.lock().active.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<Cue<K, D>> {
        self.shared.core.lock().active.get(key).cloned()
    }

    /// Active keys, sorted
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.shared.core.lock().active.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Active cues, in key order
    pub fn values(&self) -> Vec<Cue<K, D>> {
        self.entries().into_iter().map(|(_, cue)| cue).collect()
    }

    /// Active `(key, cue)` pairs, in key order
    pub fn entries(&self) -> Vec<(K, Cue<K, D>)> {
        let core = self.shared.core.lock();
        let mut entries: Vec<(K, Cue<K, D>)> = core
            .active
            .iter()
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.shared.core.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.core.lock().active.is_empty()
    }
}

impl<K: CueKey, D: CueData> Drop for Sequencer<K, D> {
    fn drop(&mut self) {
        self.shared.axis.remove_callback(self.axis_sub);
        self.shared.timing.remove_callback(self.timing_sub);
        self.shared.scheduler.remove_callback(self.scheduler_sub);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════

impl<K: CueKey, D: CueData> SequencerShared<K, D> {
    /// Axis batch reconciliation against the current playhead position
    fn on_axis_events(shared: &Arc<Self>, events: &EventMap<K, D>) {
        let Some(vector) = shared.timing.vector() else {
            log::debug!("axis update before timing is ready; deferred to readiness");
            return;
        };
        let now = shared.clock.now();
        let position = vector.position_at(now);

        let mut changes: Vec<CueChange<K, D>> = Vec::new();
        {
            let mut core = shared.core.lock();
            for (key, event) in events {
                if event.delta.is_noop() {
                    continue;
                }
                if event.delta.interval == DeltaKind::Noop {
                    // Payload-only change: coverage is unchanged, notify
                    // only when the cue is active
                    if let Some(new) = &event.new {
                        if core.active.contains_key(key) {
                            core.active.insert(key.clone(), new.clone());
                            changes.push(CueChange {
                                key: key.clone(),
                                new: Some(new.clone()),
                                old: event.old.clone(),
                            });
                        }
                    }
                    continue;
                }

                let was_active = core.active.contains_key(key);
                let should_be_active = event
                    .new
                    .as_ref()
                    .map(|cue| cue.interval.covers(position))
                    .unwrap_or(false);

                match (was_active, should_be_active) {
                    (true, false) => {
                        core.active.remove(key);
                        changes.push(CueChange {
                            key: key.clone(),
                            new: None,
                            old: event.old.clone(),
                        });
                    }
                    // should_be_active guarantees event.new is present
                    (false, true) | (true, true) => {
                        if let Some(cue) = &event.new {
                            core.active.insert(key.clone(), cue.clone());
                            changes.push(CueChange {
                                key: key.clone(),
                                new: Some(cue.clone()),
                                old: if was_active { event.old.clone() } else { None },
                            });
                        }
                    }
                    (false, false) => {}
                }
            }
        }

        if !changes.is_empty() {
            shared.emitter.emit(&changes);
        }
        // Rearm so the prefetch window sees the endpoint changes
        shared.scheduler.set_vector(vector.at(now));
    }

    /// Timing-change reconciliation
    fn on_timing_change(shared: &Arc<Self>, init: bool) {
        let Some(raw) = shared.timing.vector() else {
            return;
        };
        let now = shared.clock.now();
        // An initial snapshot is re-anchored to the local clock; a live
        // update carries an authoritative timestamp
        let vector = if init { raw.at(now) } else { raw };
        let old = shared.timing.old_vector();
        let delta = MotionDelta::classify(old.as_ref(), &vector);

        let mut hooks = Vec::new();
        let mut changes: Vec<CueChange<K, D>> = Vec::new();
        {
            let mut core = shared.core.lock();
            if !core.ready {
                core.ready = true;
                hooks = std::mem::take(&mut core.ready_hooks);
                log::debug!("sequencer ready");
            }

            if delta.pos == PosDelta::Change || delta.movement == MoveDelta::Stop {
                // Recompute the active set from scratch at the new position
                let position = vector.position_at(now);
                let target: BTreeMap<K, Cue<K, D>> = shared
                    .axis
                    .covering(position)
                    .into_iter()
                    .map(|cue| (cue.key.clone(), cue))
                    .collect();

                let mut exited: Vec<K> = core
                    .active
                    .keys()
                    .filter(|key| !target.contains_key(*key))
                    .cloned()
                    .collect();
                exited.sort();
                for key in exited {
                    let old = core.active.remove(&key);
                    changes.push(CueChange {
                        key,
                        new: None,
                        old,
                    });
                }
                for (key, cue) in target {
                    if !core.active.contains_key(&key) {
                        core.active.insert(key.clone(), cue.clone());
                        changes.push(CueChange {
                            key,
                            new: Some(cue),
                            old: None,
                        });
                    }
                }
            }
        }

        if !changes.is_empty() {
            shared.emitter.emit(&changes);
        }
        shared.scheduler.set_vector(vector);
        for hook in hooks {
            hook();
        }
    }

    /// Scheduler due-batch reconciliation
    fn on_due_batch(shared: &Arc<Self>, batch: &Vec<DueCue<K, D>>) {
        let mut changes: Vec<CueChange<K, D>> = Vec::new();
        {
            let mut core = shared.core.lock();
            for item in batch {
                let key = &item.cue.key;
                if item.endpoint.singular {
                    // The playhead grazes a point cue: an active one exits, an
                    // inactive one passes through with no net state change
                    if let Some(old) = core.active.remove(key) {
                        changes.push(CueChange {
                            key: key.clone(),
                            new: None,
                            old: Some(old),
                        });
                    } else {
                        changes.push(CueChange {
                            key: key.clone(),
                            new: Some(item.cue.clone()),
                            old: None,
                        });
                        changes.push(CueChange {
                            key: key.clone(),
                            new: None,
                            old: Some(item.cue.clone()),
                        });
                    }
                    continue;
                }

                let entering = i32::from(item.direction) * (if item.endpoint.right { -1 } else { 1 }) > 0;
                let was_active = core.active.contains_key(key);
                if entering && !was_active {
                    core.active.insert(key.clone(), item.cue.clone());
                    changes.push(CueChange {
                        key: key.clone(),
                        new: Some(item.cue.clone()),
                        old: None,
                    });
                } else if !entering && was_active {
                    let old = core.active.remove(key);
                    changes.push(CueChange {
                        key: key.clone(),
                        new: None,
                        old,
                    });
                }
            }
        }
        if !changes.is_empty() {
            shared.emitter.emit(&changes);
        }
    }
}
