//! Interval endpoint algebra
//!
//! An endpoint is an interval boundary with side and inclusivity flags.
//! Endpoints admit a total order over `(value, tie rank)` which the rest of
//! the engine relies on: the sorted endpoint index, interval relations, and
//! batch ordering of simultaneous crossings all reduce to this comparison.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tie rank for endpoints sharing a value.
///
/// At equal value, a right-open endpoint lies just below the value, closed
/// endpoints (either side) and singular points lie exactly at it, and a
/// left-open endpoint lies just above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i8)]
pub enum TieRank {
    /// Right-open: approaches the value from below
    Below = -1,
    /// Closed on either side, or a singular point
    At = 0,
    /// Left-open: departs the value from above
    Above = 1,
}

/// An interval boundary: value, side, inclusivity, and the singular flag
///
/// A singular endpoint stands for both ends of a point interval at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Position on the axis
    pub value: f64,
    /// True for an interval's upper endpoint
    pub right: bool,
    /// True when the endpoint is inclusive
    pub closed: bool,
    /// True when the endpoint is both ends of a point interval
    pub singular: bool,
}

impl Endpoint {
    /// Lower endpoint of an interval
    #[inline]
    pub fn lower(value: f64, closed: bool) -> Self {
        Self {
            value,
            right: false,
            closed,
            singular: false,
        }
    }

    /// Upper endpoint of an interval
    #[inline]
    pub fn upper(value: f64, closed: bool) -> Self {
        Self {
            value,
            right: true,
            closed,
            singular: false,
        }
    }

    /// Both ends of a point interval
    #[inline]
    pub fn point(value: f64) -> Self {
        Self {
            value,
            right: false,
            closed: true,
            singular: true,
        }
    }

    /// Tie rank within endpoints sharing this value
    #[inline]
    pub fn rank(&self) -> TieRank {
        if self.singular || self.closed {
            TieRank::At
        } else if self.right {
            TieRank::Below
        } else {
            TieRank::Above
        }
    }

    /// Total order over endpoints: by value, then tie rank.
    ///
    /// Distinct endpoints may compare `Equal` (e.g. a left-closed and a
    /// right-closed endpoint at the same value); callers that care about
    /// identity compare `right` and `closed` directly.
    #[inline]
    pub fn cmp_order(&self, other: &Endpoint) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| (self.rank() as i8).cmp(&(other.rank() as i8)))
    }

    /// Does the half-line bounded by this endpoint contain `x`?
    ///
    /// A singular endpoint covers exactly its own value.
    #[inline]
    pub fn covers(&self, x: f64) -> bool {
        if self.singular {
            return x == self.value;
        }
        match (self.right, self.closed) {
            (true, true) => x <= self.value,
            (true, false) => x < self.value,
            (false, true) => x >= self.value,
            (false, false) => x > self.value,
        }
    }
}

/// Three-way comparison in the endpoint total order
#[inline]
pub fn endpoint_cmp(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.cmp_order(b)
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank() {
        assert_eq!(Endpoint::upper(4.0, false).rank(), TieRank::Below);
        assert_eq!(Endpoint::upper(4.0, true).rank(), TieRank::At);
        assert_eq!(Endpoint::lower(4.0, true).rank(), TieRank::At);
        assert_eq!(Endpoint::point(4.0).rank(), TieRank::At);
        assert_eq!(Endpoint::lower(4.0, false).rank(), TieRank::Above);
    }

    #[test]
    fn test_order_at_equal_value() {
        let right_open = Endpoint::upper(4.0, false);
        let left_closed = Endpoint::lower(4.0, true);
        let right_closed = Endpoint::upper(4.0, true);
        let point = Endpoint::point(4.0);
        let left_open = Endpoint::lower(4.0, false);

        assert_eq!(right_open.cmp_order(&left_closed), Ordering::Less);
        assert_eq!(left_closed.cmp_order(&right_closed), Ordering::Equal);
        assert_eq!(left_closed.cmp_order(&point), Ordering::Equal);
        assert_eq!(point.cmp_order(&left_open), Ordering::Less);
        assert_eq!(left_open.cmp_order(&right_open), Ordering::Greater);
    }

    #[test]
    fn test_order_by_value_first() {
        let a = Endpoint::lower(1.0, false); // rank Above
        let b = Endpoint::upper(2.0, false); // rank Below
        assert_eq!(a.cmp_order(&b), Ordering::Less);
    }

    #[test]
    fn test_equality_needs_side_and_inclusivity() {
        let left_closed = Endpoint::lower(4.0, true);
        let right_closed = Endpoint::upper(4.0, true);
        assert_eq!(left_closed.cmp_order(&right_closed), Ordering::Equal);
        assert_ne!(left_closed, right_closed);
    }

    #[test]
    fn test_covers() {
        assert!(Endpoint::lower(2.0, true).covers(2.0));
        assert!(!Endpoint::lower(2.0, false).covers(2.0));
        assert!(Endpoint::lower(2.0, false).covers(2.1));
        assert!(Endpoint::upper(2.0, true).covers(2.0));
        assert!(!Endpoint::upper(2.0, false).covers(2.0));
        assert!(Endpoint::upper(2.0, false).covers(1.9));

        assert!(Endpoint::point(7.0).covers(7.0));
        assert!(!Endpoint::point(7.0).covers(7.0001));
    }
}
