//! # Telemetry Cycle Tracking
//!
//! The device sends its fields in blocks but nothing on the wire marks
//! where a block starts. A cycle is closed when the first key seen after
//! the previous boundary shows up again. Only keys are compared, never
//! positions, so firmware that reorders or adds fields is handled.

use std::collections::HashMap;

use crate::vedirect::decoder::Measurement;

/// Cycle boundary state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CycleTracker {
    /// Nothing seen yet
    #[default]
    Idle,
    /// Collecting fields until `sentinel` repeats
    Accumulating { sentinel: String },
    /// `sentinel` just repeated and closed a cycle
    BoundaryJustClosed { sentinel: String },
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a key
    ///
    /// Returns `true` when the key closes the current cycle. The record
    /// carrying that key belongs to the next cycle.
    ///
    /// `eligible` says whether the key may become the sentinel; keys that
    /// only exist once per cycle at a variable position (synthesized
    /// fields relayed by an owner) should not.
    pub fn observe(&mut self, key: &str, eligible: bool) -> bool {
        match self {
            CycleTracker::Idle => {
                if eligible {
                    *self = CycleTracker::Accumulating {
                        sentinel: key.to_string(),
                    };
                }
                false
            }
            CycleTracker::Accumulating { sentinel } | CycleTracker::BoundaryJustClosed { sentinel } => {
                let sentinel = std::mem::take(sentinel);
                let closed = sentinel == key;
                *self = if closed {
                    CycleTracker::BoundaryJustClosed { sentinel }
                } else {
                    CycleTracker::Accumulating { sentinel }
                };
                closed
            }
        }
    }

    /// Key that closes cycles, once known
    pub fn sentinel(&self) -> Option<&str> {
        match self {
            CycleTracker::Idle => None,
            CycleTracker::Accumulating { sentinel } | CycleTracker::BoundaryJustClosed { sentinel } => {
                Some(sentinel)
            }
        }
    }
}

/// Measurements collected since the last boundary
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    fields: HashMap<&'static str, Measurement>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement, replacing an earlier one with the same key
    pub fn insert(&mut self, measurement: Measurement) {
        self.fields.insert(measurement.key(), measurement);
    }

    pub fn get(&self, key: &str) -> Option<&Measurement> {
        self.fields.get(key)
    }

    /// Raw integer value of a numeric field
    pub fn numeric(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|m| m.numeric)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}
