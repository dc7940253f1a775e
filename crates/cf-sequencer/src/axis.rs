//! Interval-indexed cue store (the axis)
//!
//! The axis owns the cue map and keeps a sorted endpoint index plus a
//! point-to-keys map in lockstep with it. Batch updates produce one event per
//! touched key describing what changed (interval, payload, both, or nothing),
//! delivered synchronously to subscribers after the state lock is released so
//! subscribers may re-enter the axis.
//!
//! Invariant: after any update the endpoint index holds exactly the endpoint
//! values of stored cues, each once, and the point map agrees.

use crate::emitter::{CallbackHandle, Emitter};
use crate::index::EndpointIndex;
use cf_core::{Cue, Interval};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

/// Bounds required of cue keys throughout the engine
///
/// `Ord` makes batch notifications deterministic (key order); `Hash` backs
/// the cue map; the rest lets events cross the timer-thread boundary.
pub trait CueKey: Clone + Eq + Hash + Ord + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + Ord + Send + Sync + 'static> CueKey for T {}

/// Bounds required of cue payloads
///
/// `PartialEq` is only used to classify payload deltas.
pub trait CueData: Clone + PartialEq + Send + Sync + 'static {}
impl<T: Clone + PartialEq + Send + Sync + 'static> CueData for T {}

/// Whether one facet of a cue changed in an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Noop,
    Change,
}

/// Per-facet change classification for one cue event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueDelta {
    pub interval: DeltaKind,
    pub data: DeltaKind,
}

impl CueDelta {
    pub const NOOP: Self = Self {
        interval: DeltaKind::Noop,
        data: DeltaKind::Noop,
    };

    pub fn is_noop(&self) -> bool {
        *self == Self::NOOP
    }
}

/// Lifecycle classification of one cue event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueEventKind {
    Noop,
    Insert,
    Delete,
    Change,
}

/// One cue mutation from a batch update
#[derive(Debug, Clone)]
pub struct CueEvent<K, D> {
    pub key: K,
    pub new: Option<Cue<K, D>>,
    pub old: Option<Cue<K, D>>,
    pub delta: CueDelta,
}

impl<K, D> CueEvent<K, D> {
    pub fn kind(&self) -> CueEventKind {
        match (&self.old, &self.new) {
            (None, Some(_)) => CueEventKind::Insert,
            (Some(_), None) => CueEventKind::Delete,
            (Some(_), Some(_)) if self.delta.is_noop() => CueEventKind::Noop,
            (Some(_), Some(_)) => CueEventKind::Change,
            (None, None) => CueEventKind::Noop,
        }
    }
}

/// Batch of cue events, keyed and iterated in key order
pub type EventMap<K, D> = BTreeMap<K, CueEvent<K, D>>;

/// One entry of a batch update
#[derive(Debug, Clone)]
pub enum AxisOp<K, D> {
    /// Insert or replace the cue under `key`
    Put { key: K, interval: Interval, data: D },
    /// Delete the cue under `key`; absent keys are ignored
    Remove { key: K },
}

impl<K, D> AxisOp<K, D> {
    pub fn put(key: K, interval: Interval, data: D) -> Self {
        Self::Put {
            key,
            interval,
            data,
        }
    }

    pub fn remove(key: K) -> Self {
        Self::Remove { key }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AXIS STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Hash key for an endpoint value; −0.0 folds into +0.0
#[inline]
fn point_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

struct AxisState<K, D> {
    cues: HashMap<K, Cue<K, D>>,
    /// Endpoint value → keys of cues with an endpoint there
    point_map: HashMap<u64, SmallVec<[K; 2]>>,
    index: EndpointIndex,
}

impl<K: CueKey, D: CueData> AxisState<K, D> {
    fn new() -> Self {
        Self {
            cues: HashMap::new(),
            point_map: HashMap::new(),
            index: EndpointIndex::new(),
        }
    }

    /// Detach `key` from the point map, recording touched values
    fn detach(&mut self, cue: &Cue<K, D>, touched: &mut HashSet<u64>) {
        for ep in cue.interval.endpoints() {
            let bits = point_key(ep.value);
            touched.insert(bits);
            if let Some(keys) = self.point_map.get_mut(&bits) {
                keys.retain(|k| *k != cue.key);
                if keys.is_empty() {
                    self.point_map.remove(&bits);
                }
            }
        }
    }

    /// Attach `key` to the point map, recording touched values
    fn attach(&mut self, cue: &Cue<K, D>, touched: &mut HashSet<u64>) {
        for ep in cue.interval.endpoints() {
            let bits = point_key(ep.value);
            touched.insert(bits);
            let keys = self.point_map.entry(bits).or_default();
            if !keys.contains(&cue.key) {
                keys.push(cue.key.clone());
            }
        }
    }

    /// Reconcile the endpoint index with the point map for `touched` values
    fn sync_index(&mut self, touched: &HashSet<u64>) {
        let mut to_remove = Vec::new();
        let mut to_insert = Vec::new();
        for &bits in touched {
            let value = f64::from_bits(bits);
            if self.point_map.contains_key(&bits) {
                to_insert.push(value);
            } else {
                to_remove.push(value);
            }
        }
        self.index.update(&to_remove, &to_insert);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AXIS
// ═══════════════════════════════════════════════════════════════════════════

/// The interval-indexed cue store
pub struct Axis<K, D> {
    state: RwLock<AxisState<K, D>>,
    emitter: Emitter<EventMap<K, D>>,
}

impl<K: CueKey, D: CueData> Axis<K, D> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AxisState::new()),
            emitter: Emitter::new(),
        }
    }

    /// Apply a batch of puts and removes.
    ///
    /// Removes are processed before puts, so a key appearing as both collapses
    /// into a single replacement event. Subscribers are notified synchronously
    /// with the returned event map (no-op mutations included, flagged by
    /// their delta so downstream code can skip them cheaply).
    pub fn update(&self, batch: Vec<AxisOp<K, D>>) -> EventMap<K, D> {
        // Capture the pre-batch cue per key once; the final state wins per key
        let mut olds: BTreeMap<K, Option<Cue<K, D>>> = BTreeMap::new();
        let mut touched: HashSet<u64> = HashSet::new();

        let mut state = self.state.write();

        // Deletions first, then insertions
        for op in &batch {
            if let AxisOp::Remove { key } = op {
                if let Some(old) = state.cues.remove(key) {
                    state.detach(&old, &mut touched);
                    olds.entry(key.clone()).or_insert(Some(old));
                }
            }
        }

        for op in batch {
            if let AxisOp::Put {
                key,
                interval,
                data,
            } = op
            {
                let cue = Cue::new(key.clone(), interval, data);
                if let Some(prev) = state.cues.remove(&key) {
                    state.detach(&prev, &mut touched);
                    olds.entry(key.clone()).or_insert(Some(prev));
                } else {
                    olds.entry(key.clone()).or_insert(None);
                }
                state.attach(&cue, &mut touched);
                state.cues.insert(key, cue);
            }
        }

        state.sync_index(&touched);

        let mut events: EventMap<K, D> = BTreeMap::new();
        for (key, old) in olds {
            let new = state.cues.get(&key).cloned();
            let delta = match (&old, &new) {
                (Some(o), Some(n)) => CueDelta {
                    interval: if o.interval == n.interval {
                        DeltaKind::Noop
                    } else {
                        DeltaKind::Change
                    },
                    data: if o.data == n.data {
                        DeltaKind::Noop
                    } else {
                        DeltaKind::Change
                    },
                },
                (None, None) => CueDelta::NOOP,
                _ => CueDelta {
                    interval: DeltaKind::Change,
                    data: DeltaKind::Change,
                },
            };
            events.insert(
                key.clone(),
                CueEvent {
                    key,
                    new,
                    old,
                    delta,
                },
            );
        }
        drop(state);

        log::debug!("axis update: {} event(s)", events.len());
        if !events.is_empty() {
            self.emitter.emit(&events);
        }
        events
    }

    /// Remove every cue, producing delete events for all of them
    pub fn clear(&self) -> EventMap<K, D> {
        let keys: Vec<K> = self.state.read().cues.keys().cloned().collect();
        self.update(keys.into_iter().map(AxisOp::remove).collect())
    }

    /// Cues whose interval relation to `query` is one of the overlap/cover
    /// relations, in key order
    pub fn lookup(&self, query: &Interval) -> Vec<Cue<K, D>> {
        let state = self.state.read();
        let mut out: Vec<Cue<K, D>> = state
            .cues
            .values()
            .filter(|cue| cue.interval.compare(query).matches_lookup())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Cues whose interval covers `position`, in key order
    pub fn covering(&self, position: f64) -> Vec<Cue<K, D>> {
        let state = self.state.read();
        let mut out: Vec<Cue<K, D>> = state
            .cues
            .values()
            .filter(|cue| cue.interval.covers(position))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Subscribe to batch events
    pub fn add_callback(
        &self,
        callback: impl Fn(&EventMap<K, D>) + Send + Sync + 'static,
    ) -> CallbackHandle {
        self.emitter.add_callback(callback)
    }

    pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
        self.emitter.remove_callback(handle)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MAP-LIKE ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn has(&self, key: &K) -> bool {
        self.state.read().cues.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<Cue<K, D>> {
        self.state.read().cues.get(key).cloned()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.state.read().cues.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All cues, in key order
    pub fn cues(&self) -> Vec<Cue<K, D>> {
        let state = self.state.read();
        let mut out: Vec<Cue<K, D>> = state.cues.values().cloned().collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn len(&self) -> usize {
        self.state.read().cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().cues.is_empty()
    }

    /// Endpoint values currently indexed, ascending (test and debug aid)
    pub fn endpoint_values(&self) -> Vec<f64> {
        self.state.read().index.values().to_vec()
    }
}

impl<K: CueKey, D: CueData> Default for Axis<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
