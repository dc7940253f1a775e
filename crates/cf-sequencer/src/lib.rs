//! CueForge Temporal Cue Sequencer
//!
//! Real-time maintenance of the set of active cues as a playhead sweeps a
//! one-dimensional axis:
//! - Interval-indexed cue store with batch updates and per-key deltas
//! - Sorted endpoint index with binary-search lookups
//! - Lookahead scheduler firing endpoint crossings at their due times
//! - Sequencer folding axis, timing, and schedule events into enter/change/
//!   exit transitions
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      SEQUENCING PIPELINE                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   cue producers          timing source                           │
//! │        │                      │                                  │
//! │        ▼                      ▼                                  │
//! │   ┌─────────┐  deltas   ┌───────────┐   vector   ┌───────────┐  │
//! │   │  Axis   │──────────▶│ Sequencer │───────────▶│ Scheduler │  │
//! │   │ (cues + │           │ (active   │            │ (window + │  │
//! │   │  index) │◀──lookup──│   set)    │◀───due─────│  timer)   │  │
//! │   └─────────┘           └───────────┘   batches  └───────────┘  │
//! │                               │                                  │
//! │                               ▼                                  │
//! │                     {key, new, old} stream                       │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cf_sequencer::{Axis, AxisOp, InternalTiming, Sequencer, SystemClock};
//! use cf_core::{Interval, MotionVector};
//! use std::sync::Arc;
//!
//! let axis = Arc::new(Axis::new());
//! let timing = Arc::new(InternalTiming::new(Arc::new(SystemClock::new())));
//! let sequencer = Sequencer::new(Arc::clone(&axis), timing.clone());
//!
//! sequencer.add_callback(|changes| {
//!     for change in changes {
//!         // enter: old == None, exit: new == None
//!     }
//! });
//!
//! axis.update(vec![AxisOp::put("intro", Interval::closed(0.0, 10.0)?, ())]);
//! timing.update(MotionVector::new(0.0, 1.0, 0.0, 0.0))?;
//! ```

pub mod axis;
pub mod clock;
pub mod emitter;
pub mod index;
pub mod schedule;
pub mod sequencer;
pub mod timing;

// Re-exports
pub use axis::{
    Axis, AxisOp, CueData, CueDelta, CueEvent, CueEventKind, CueKey, DeltaKind, EventMap,
};
pub use clock::{Clock, ManualClock, SystemClock, TimeoutHandle, TimerCallback};
pub use emitter::{CallbackHandle, Emitter};
pub use index::EndpointIndex;
pub use schedule::{DueCue, Scheduler, SchedulerConfig, SchedulerState};
pub use sequencer::{CueChange, Sequencer};
pub use timing::{InternalTiming, Timing, TimingChange};
