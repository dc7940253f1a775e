//! Cues: keyed intervals with opaque payload data

use crate::interval::Interval;

/// A keyed interval with attached payload data
///
/// Keys are unique within an axis. The payload is opaque to sequencing logic;
/// it only needs `PartialEq` so no-op data updates can be skipped downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue<K, D> {
    pub key: K,
    pub interval: Interval,
    pub data: D,
}

impl<K, D> Cue<K, D> {
    pub fn new(key: K, interval: Interval, data: D) -> Self {
        Self {
            key,
            interval,
            data,
        }
    }
}
