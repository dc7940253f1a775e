//! Sorted endpoint index
//!
//! A sorted sequence of unique endpoint values backing the axis. Bulk updates
//! pick a strategy by batch size: small batches locate-and-splice per element,
//! large batches rebuild with a sort-merge pass. Either way the contract is
//! an idempotent set difference: duplicate insertions and absent removals are
//! ignored, and the post-state equals `(prev ∪ to_insert) \ to_remove`.
//!
//! Values are compared with `f64::total_cmp`; callers validate finiteness at
//! the axis boundary, so NaN never enters the index.

use cf_core::Interval;
use std::cmp::Ordering;

/// Batches at most this large take the per-element splice path
const SPLICE_BATCH_MAX: usize = 100;

/// Sorted unique endpoint values with binary-search lookups
#[derive(Debug, Clone, Default)]
pub struct EndpointIndex {
    values: Vec<f64>,
}

impl EndpointIndex {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// All values, ascending
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Binary search: `Ok(index)` when found, `Err(insertion_index)` when not
    #[inline]
    pub fn search(&self, x: f64) -> Result<usize, usize> {
        self.values.binary_search_by(|v| v.total_cmp(&x))
    }

    pub fn contains(&self, x: f64) -> bool {
        self.search(x).is_ok()
    }

    /// Greatest index with value strictly below `x`
    pub fn index_lt(&self, x: f64) -> Option<usize> {
        let i = match self.search(x) {
            Ok(i) => i,
            Err(i) => i,
        };
        i.checked_sub(1)
    }

    /// Greatest index with value at or below `x`
    pub fn index_le(&self, x: f64) -> Option<usize> {
        match self.search(x) {
            Ok(i) => Some(i),
            Err(i) => i.checked_sub(1),
        }
    }

    /// Smallest index with value strictly above `x`
    pub fn index_gt(&self, x: f64) -> Option<usize> {
        let i = match self.search(x) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        (i < self.values.len()).then_some(i)
    }

    /// Smallest index with value at or above `x`
    pub fn index_ge(&self, x: f64) -> Option<usize> {
        let i = match self.search(x) {
            Ok(i) => i,
            Err(i) => i,
        };
        (i < self.values.len()).then_some(i)
    }

    /// Values contained in `interval`, respecting inclusivity
    pub fn lookup(&self, interval: &Interval) -> &[f64] {
        let start = if interval.low_closed() {
            self.index_ge(interval.low())
        } else {
            self.index_gt(interval.low())
        };
        let Some(start) = start else {
            return &[];
        };
        let end = if interval.high_closed() {
            self.index_le(interval.high())
        } else {
            self.index_lt(interval.high())
        };
        match end {
            Some(end) if start <= end => &self.values[start..=end],
            _ => &[],
        }
    }

    /// Bulk mutation: remove `to_remove`, insert `to_insert`
    pub fn update(&mut self, to_remove: &[f64], to_insert: &[f64]) {
        if to_remove.len() + to_insert.len() <= SPLICE_BATCH_MAX {
            self.splice_update(to_remove, to_insert);
        } else {
            self.rebuild_update(to_remove, to_insert);
        }
    }

    /// Per-element locate-and-splice, O(B * (log N + N))
    ///
    /// Insertions first, removals last: a value named in both lists ends up
    /// removed, matching `(prev ∪ to_insert) \ to_remove`.
    fn splice_update(&mut self, to_remove: &[f64], to_insert: &[f64]) {
        for &value in to_insert {
            if let Err(i) = self.search(value) {
                self.values.insert(i, value);
            }
        }
        for &value in to_remove {
            if let Ok(i) = self.search(value) {
                self.values.remove(i);
            }
        }
    }

    /// Sort-merge rebuild, O((N + B) * log(N + B))
    fn rebuild_update(&mut self, to_remove: &[f64], to_insert: &[f64]) {
        let mut removal = to_remove.to_vec();
        removal.sort_by(f64::total_cmp);
        let removed = |v: &f64| removal.binary_search_by(|r| r.total_cmp(v)).is_ok();
        self.values.retain(|v| !removed(v));
        self.values
            .extend(to_insert.iter().copied().filter(|v| !removed(v)));
        self.values.sort_by(f64::total_cmp);
        self.values
            .dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
