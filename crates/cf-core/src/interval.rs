//! Intervals on the playback axis
//!
//! Intervals are validated at construction: `low <= high`, finite bounds, and
//! no empty interval (`low == high` with an open endpoint). A *singular*
//! interval has `low == high` with both endpoints inclusive and represents a
//! point on the axis.

use crate::endpoint::Endpoint;
use crate::error::{CfError, CfResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Relation of one interval to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// Entirely left of the other, no intersection
    OutsideLeft,
    /// Starts left of the other and ends inside it
    OverlapLeft,
    /// Contained in the other (not equal)
    Covered,
    /// Same extent and inclusivity
    Equal,
    /// Contains the other (not equal)
    Covers,
    /// Starts inside the other and ends right of it
    OverlapRight,
    /// Entirely right of the other, no intersection
    OutsideRight,
}

impl Relation {
    /// Relations that count as a hit for interval lookup
    #[inline]
    pub fn matches_lookup(self) -> bool {
        !matches!(self, Relation::OutsideLeft | Relation::OutsideRight)
    }
}

/// A half-open-aware interval `low..high` on the axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    low: f64,
    high: f64,
    low_closed: bool,
    high_closed: bool,
}

impl Interval {
    /// Validated constructor
    pub fn new(low: f64, high: f64, low_closed: bool, high_closed: bool) -> CfResult<Self> {
        if !low.is_finite() {
            return Err(CfError::NonFinite("interval low", low));
        }
        if !high.is_finite() {
            return Err(CfError::NonFinite("interval high", high));
        }
        match low.partial_cmp(&high) {
            Some(Ordering::Greater) | None => return Err(CfError::InvalidInterval(low, high)),
            Some(Ordering::Equal) if !(low_closed && high_closed) => {
                return Err(CfError::EmptyInterval(low));
            }
            _ => {}
        }
        Ok(Self {
            low,
            high,
            low_closed,
            high_closed,
        })
    }

    /// `[low, high]`
    pub fn closed(low: f64, high: f64) -> CfResult<Self> {
        Self::new(low, high, true, true)
    }

    /// `(low, high)`
    pub fn open(low: f64, high: f64) -> CfResult<Self> {
        Self::new(low, high, false, false)
    }

    /// `[low, high)`
    pub fn closed_open(low: f64, high: f64) -> CfResult<Self> {
        Self::new(low, high, true, false)
    }

    /// `(low, high]`
    pub fn open_closed(low: f64, high: f64) -> CfResult<Self> {
        Self::new(low, high, false, true)
    }

    /// Point interval `[value, value]`
    pub fn singular(value: f64) -> CfResult<Self> {
        Self::new(value, value, true, true)
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    pub fn low_closed(&self) -> bool {
        self.low_closed
    }

    #[inline]
    pub fn high_closed(&self) -> bool {
        self.high_closed
    }

    /// True for a point interval
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.low == self.high
    }

    /// Lower endpoint (the singular endpoint for a point interval)
    #[inline]
    pub fn low_endpoint(&self) -> Endpoint {
        if self.is_singular() {
            Endpoint::point(self.low)
        } else {
            Endpoint::lower(self.low, self.low_closed)
        }
    }

    /// Upper endpoint (the singular endpoint for a point interval)
    #[inline]
    pub fn high_endpoint(&self) -> Endpoint {
        if self.is_singular() {
            Endpoint::point(self.high)
        } else {
            Endpoint::upper(self.high, self.high_closed)
        }
    }

    /// Both endpoints; a single entry for a point interval
    pub fn endpoints(&self) -> SmallVec<[Endpoint; 2]> {
        if self.is_singular() {
            SmallVec::from_buf_and_len([Endpoint::point(self.low), Endpoint::point(self.low)], 1)
        } else {
            SmallVec::from_buf([self.low_endpoint(), self.high_endpoint()])
        }
    }

    /// Does the interval contain `x`?
    #[inline]
    pub fn covers(&self, x: f64) -> bool {
        self.low_endpoint().covers(x) && self.high_endpoint().covers(x)
    }

    /// Relation of `self` to `other`
    pub fn compare(&self, other: &Interval) -> Relation {
        let al = self.low_endpoint();
        let ah = self.high_endpoint();
        let bl = other.low_endpoint();
        let bh = other.high_endpoint();

        // Disjointness falls out of the endpoint order: a right endpoint
        // strictly below a left endpoint leaves no shared point.
        if ah.cmp_order(&bl) == Ordering::Less {
            return Relation::OutsideLeft;
        }
        if bh.cmp_order(&al) == Ordering::Less {
            return Relation::OutsideRight;
        }

        let low_cmp = al.cmp_order(&bl);
        let high_cmp = ah.cmp_order(&bh);
        match (low_cmp, high_cmp) {
            (Ordering::Equal, Ordering::Equal) => Relation::Equal,
            (Ordering::Less, Ordering::Less) => Relation::OverlapLeft,
            (Ordering::Greater, Ordering::Greater) => Relation::OverlapRight,
            // Starts at/after and ends at/before: contained in `other`
            (Ordering::Greater | Ordering::Equal, Ordering::Less | Ordering::Equal) => {
                Relation::Covered
            }
            _ => Relation::Covers,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.low_closed { '[' } else { '(' },
            self.low,
            self.high,
            if self.high_closed { ']' } else { ')' },
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
