//! Playhead motion model
//!
//! The playhead is a kinematic vector: position, velocity, acceleration, and
//! the timestamp they were sampled at. Evaluating the vector at a later clock
//! time yields the projected position; solving the motion quadratic against a
//! set of target positions yields endpoint-crossing times for the scheduler.

use crate::error::{CfError, CfResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Kinematic state of the playhead at a point in clock time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionVector {
    /// Position on the axis
    pub position: f64,
    /// Velocity in axis units per second
    pub velocity: f64,
    /// Acceleration in axis units per second squared
    pub acceleration: f64,
    /// Clock time the state was sampled at
    pub timestamp: f64,
}

impl MotionVector {
    pub fn new(position: f64, velocity: f64, acceleration: f64, timestamp: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration,
            timestamp,
        }
    }

    /// A paused playhead at `position`
    pub fn stationary(position: f64, timestamp: f64) -> Self {
        Self::new(position, 0.0, 0.0, timestamp)
    }

    /// All components finite?
    pub fn validate(&self) -> CfResult<()> {
        for (name, v) in [
            ("position", self.position),
            ("velocity", self.velocity),
            ("acceleration", self.acceleration),
            ("timestamp", self.timestamp),
        ] {
            if !v.is_finite() {
                return Err(CfError::InvalidVector(format!("{name} = {v}")));
            }
        }
        Ok(())
    }

    /// True when velocity or acceleration is non-zero
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.velocity != 0.0 || self.acceleration != 0.0
    }

    /// Projected position at clock time `t`
    #[inline]
    pub fn position_at(&self, t: f64) -> f64 {
        let d = t - self.timestamp;
        self.position + self.velocity * d + 0.5 * self.acceleration * d * d
    }

    /// Projected velocity at clock time `t`
    #[inline]
    pub fn velocity_at(&self, t: f64) -> f64 {
        self.velocity + self.acceleration * (t - self.timestamp)
    }

    /// The vector re-anchored at clock time `t`
    pub fn at(&self, t: f64) -> MotionVector {
        MotionVector {
            position: self.position_at(t),
            velocity: self.velocity_at(t),
            acceleration: self.acceleration,
            timestamp: t,
        }
    }

    /// Direction of travel at clock time `t`: -1, 0, or +1
    ///
    /// Falls back to the acceleration sign at a velocity zero-crossing.
    pub fn direction_at(&self, t: f64) -> i8 {
        let v = self.velocity_at(t);
        if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else if self.acceleration > 0.0 {
            1
        } else if self.acceleration < 0.0 {
            -1
        } else {
            0
        }
    }

    /// Future offsets `dt > 0` at which the trajectory reaches `target`,
    /// ascending. Empty when the target is never reached.
    ///
    /// With acceleration the motion quadratic can cross a target twice
    /// (approach, reverse, recross); both roots matter to the scheduler.
    pub fn crossing_times(&self, target: f64) -> SmallVec<[f64; 2]> {
        let mut out = SmallVec::new();
        let c = self.position - target;
        if self.acceleration == 0.0 {
            if self.velocity != 0.0 {
                let dt = -c / self.velocity;
                if dt > 0.0 {
                    out.push(dt);
                }
            }
            return out;
        }
        // 0.5*a*dt^2 + v*dt + c = 0
        let disc = self.velocity * self.velocity - 2.0 * self.acceleration * c;
        if disc < 0.0 {
            return out;
        }
        let sqrt = disc.sqrt();
        let r1 = (-self.velocity - sqrt) / self.acceleration;
        let r2 = (-self.velocity + sqrt) / self.acceleration;
        let (lo, hi) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
        if lo > 0.0 {
            out.push(lo);
        }
        if hi > 0.0 && hi != lo {
            out.push(hi);
        }
        out
    }

    /// Smallest positive offset `dt` at which the trajectory reaches any of
    /// `targets`, with the index of the target reached. Ties break by lowest
    /// target index. `None` when no target is ever reached.
    pub fn time_to_targets(&self, targets: &[f64]) -> Option<(f64, usize)> {
        let mut best: Option<(f64, usize)> = None;
        for (idx, &target) in targets.iter().enumerate() {
            if let Some(&dt) = self.crossing_times(target).first() {
                match best {
                    Some((best_dt, _)) if dt >= best_dt => {}
                    _ => best = Some((dt, idx)),
                }
            }
        }
        best
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MOTION DELTA
// ═══════════════════════════════════════════════════════════════════════════

/// Position continuity across a vector transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosDelta {
    /// New position equals the old trajectory evaluated at the new timestamp
    Noop,
    /// Position discontinuity (jump)
    Change,
}

/// Movement-state transition across a vector change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDelta {
    Noop,
    Start,
    Stop,
    /// Moving before and after, with different velocity or acceleration
    Change,
}

/// Classification of a motion-vector transition, per axis independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionDelta {
    pub pos: PosDelta,
    pub movement: MoveDelta,
}

impl MotionDelta {
    /// Classify the transition from `old` to `new`.
    ///
    /// `old == None` is the initial snapshot: position is considered a jump,
    /// movement starts if the new vector moves.
    pub fn classify(old: Option<&MotionVector>, new: &MotionVector) -> Self {
        let Some(old) = old else {
            return Self {
                pos: PosDelta::Change,
                movement: if new.is_moving() {
                    MoveDelta::Start
                } else {
                    MoveDelta::Noop
                },
            };
        };

        let pos = if old.position_at(new.timestamp) == new.position {
            PosDelta::Noop
        } else {
            PosDelta::Change
        };

        let movement = match (old.is_moving(), new.is_moving()) {
            (false, false) => MoveDelta::Noop,
            (false, true) => MoveDelta::Start,
            (true, false) => MoveDelta::Stop,
            (true, true) => {
                if old.velocity_at(new.timestamp) == new.velocity
                    && old.acceleration == new.acceleration
                {
                    MoveDelta::Noop
                } else {
                    MoveDelta::Change
                }
            }
        };

        Self { pos, movement }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
