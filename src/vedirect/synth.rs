//! # Derived Metric Synthesizer
//!
//! Fields that never appear on the wire but are computed once per cycle:
//!
//! - `TIME`: capture timestamp (source owner only)
//! - `PWR`: voltage × current, in hundredths of a watt
//! - `EVT`: minutes since the last heavy discharge (source owner only)
//!
//! Synthesis never fails. A field whose inputs are missing, or which is
//! already present in the cycle because an owner relayed it, is skipped.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::catalog::{self, CURRENT_KEY, EVENT_KEY, POWER_KEY, TIME_KEY, VOLTAGE_KEY};
use super::decoder::{decode_value, Measurement};
use crate::cycle::CycleState;
use crate::relay::Role;
use crate::sink::snapshot::atomic_write;

/// Discharge current that starts an event (mA, magnitude)
pub const EVENT_CURRENT_THRESHOLD_MA: i64 = 50_000;

/// mV × mA to hundredths of a watt
const POWER_DIVISOR: i64 = 10_000;

/// Persisted start time of the last heavy-discharge event
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    path: Option<PathBuf>,
    last_start: Option<i64>,
}

impl EventStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the marker file, if it exists
    ///
    /// A missing or unreadable marker means no event has been seen yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let last_start = match fs::read_to_string(&path) {
            Ok(contents) => match contents.trim().parse::<i64>() {
                Ok(epoch) => Some(epoch),
                Err(_) => {
                    warn!("Ignoring corrupt event marker {}", path.display());
                    None
                }
            },
            Err(_) => None,
        };
        debug!("Event marker {}: {:?}", path.display(), last_start);

        Self {
            path: Some(path),
            last_start,
        }
    }

    /// Epoch seconds of the last recorded event start
    pub fn last_start(&self) -> Option<i64> {
        self.last_start
    }

    /// Record a new event start and persist it
    pub fn record(&mut self, epoch: i64) {
        self.last_start = Some(epoch);
        if let Some(path) = &self.path {
            if let Err(e) = atomic_write(path, epoch.to_string().as_bytes()) {
                warn!("Failed to persist event marker {}: {}", path.display(), e);
            }
        }
    }
}

/// Per-cycle synthesizer
#[derive(Debug)]
pub struct Synthesizer {
    role: Role,
    events: EventStore,
}

impl Synthesizer {
    pub fn new(role: Role, events: EventStore) -> Self {
        Self { role, events }
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Compute the derived fields for a completed cycle
    ///
    /// Returned in the order they should be published and displayed.
    pub fn synthesize(&mut self, cycle: &CycleState, now: DateTime<Local>) -> Vec<Measurement> {
        let mut out = Vec::with_capacity(3);
        let owner = self.role == Role::SourceOwner;

        if owner && !cycle.contains(TIME_KEY) {
            push(&mut out, TIME_KEY, now.timestamp().to_string());
        }

        if !cycle.contains(POWER_KEY) {
            if let Some(power) = power(cycle) {
                push(&mut out, POWER_KEY, power.to_string());
            }
        }

        if owner && !cycle.contains(EVENT_KEY) {
            if let Some(current) = cycle.numeric(CURRENT_KEY) {
                let elapsed = self.event_elapsed(current, now.timestamp());
                push(&mut out, EVENT_KEY, elapsed.to_string());
            }
        }

        out
    }

    /// Minutes since the last event, 0 if one is happening now, -1 if none
    /// has ever been seen
    fn event_elapsed(&mut self, current_ma: i64, now: i64) -> i64 {
        if current_ma < -EVENT_CURRENT_THRESHOLD_MA {
            if self.events.last_start().is_none() {
                info!("First heavy discharge event ({} mA)", current_ma);
            }
            self.events.record(now);
            return 0;
        }

        match self.events.last_start() {
            Some(start) => (now - start).max(0) / 60,
            None => -1,
        }
    }
}

/// Hundredths of a watt from the cycle's voltage and current
///
/// `None` if either input is missing or the product does not fit.
pub fn power(cycle: &CycleState) -> Option<i64> {
    let mv = cycle.numeric(VOLTAGE_KEY)?;
    let ma = cycle.numeric(CURRENT_KEY)?;
    mv.checked_mul(ma).map(|p| p / POWER_DIVISOR)
}

fn push(out: &mut Vec<Measurement>, key: &str, raw: String) {
    let Some(spec) = catalog::lookup(key) else {
        return;
    };
    match decode_value(spec, &raw) {
        Ok(m) => out.push(m),
        Err(e) => warn!("Dropping synthesized {}: {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn cycle(fields: &[(&str, &str)]) -> CycleState {
        let mut state = CycleState::new();
        for (key, value) in fields {
            let spec = catalog::lookup(key).unwrap();
            state.insert(decode_value(spec, value).unwrap());
        }
        state
    }

    fn at(epoch: i64) -> DateTime<Local> {
        Local.timestamp_opt(epoch, 0).single().unwrap()
    }

    fn find<'a>(out: &'a [Measurement], key: &str) -> Option<&'a Measurement> {
        out.iter().find(|m| m.key() == key)
    }

    #[test]
    fn test_power_from_voltage_and_current() {
        let state = cycle(&[("V", "12358"), ("I", "-254")]);
        assert_eq!(power(&state), Some(-313));

        let mut synth = Synthesizer::new(Role::Subscriber, EventStore::in_memory());
        let out = synth.synthesize(&state, at(1_000));
        let pwr = find(&out, POWER_KEY).unwrap();
        assert_eq!(pwr.raw_value, "-313");
        assert_eq!(pwr.display(false), "-3.13 W");
    }

    #[test]
    fn test_power_needs_both_inputs() {
        assert_eq!(power(&cycle(&[("V", "12358")])), None);
        assert_eq!(power(&cycle(&[("I", "100")])), None);
    }

    #[test]
    fn test_power_overflow_is_skipped() {
        let max = i64::MAX.to_string();
        let state = cycle(&[("V", max.as_str()), ("I", "2")]);
        assert_eq!(power(&state), None);

        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::in_memory());
        let out = synth.synthesize(&state, at(1_000));
        assert!(find(&out, POWER_KEY).is_none());
        assert!(find(&out, TIME_KEY).is_some());
        assert!(find(&out, EVENT_KEY).is_some());
    }

    #[test]
    fn test_owner_stamps_time() {
        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::in_memory());
        let out = synth.synthesize(&cycle(&[("V", "12000")]), at(1_760_000_000));
        assert_eq!(out[0].key(), TIME_KEY);
        assert_eq!(out[0].raw_value, "1760000000");
        // no current, so no power and no event
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_subscriber_does_not_synthesize_time_or_event() {
        let mut synth = Synthesizer::new(Role::Subscriber, EventStore::in_memory());
        let out = synth.synthesize(&cycle(&[("V", "12000"), ("I", "-60000")]), at(1_000));
        assert!(find(&out, TIME_KEY).is_none());
        assert!(find(&out, EVENT_KEY).is_none());
        assert!(find(&out, POWER_KEY).is_some());
    }

    #[test]
    fn test_relayed_fields_are_not_resynthesized() {
        let mut synth = Synthesizer::new(Role::Subscriber, EventStore::in_memory());
        let state = cycle(&[("V", "12000"), ("I", "1000"), ("PWR", "1200")]);
        assert!(synth.synthesize(&state, at(1_000)).is_empty());
    }

    #[test]
    fn test_event_never_seen() {
        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::in_memory());
        let out = synth.synthesize(&cycle(&[("I", "-1000")]), at(1_000));
        let evt = find(&out, EVENT_KEY).unwrap();
        assert_eq!(evt.numeric, Some(-1));
        assert_eq!(evt.value_text(), "infinite");
    }

    #[test]
    fn test_event_start_and_elapsed() {
        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::in_memory());

        let out = synth.synthesize(&cycle(&[("I", "-50001")]), at(10_000));
        assert_eq!(find(&out, EVENT_KEY).unwrap().numeric, Some(0));
        assert_eq!(synth.events().last_start(), Some(10_000));

        let out = synth.synthesize(&cycle(&[("I", "-2000")]), at(10_000 + 90 * 60));
        let evt = find(&out, EVENT_KEY).unwrap();
        assert_eq!(evt.numeric, Some(90));
        assert_eq!(evt.value_text(), "1h 30m");
    }

    #[test]
    fn test_threshold_is_exclusive_and_directional() {
        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::in_memory());
        synth.synthesize(&cycle(&[("I", "-50000")]), at(1_000));
        assert_eq!(synth.events().last_start(), None);

        // heavy charging is not a discharge event
        synth.synthesize(&cycle(&[("I", "80000")]), at(1_000));
        assert_eq!(synth.events().last_start(), None);
    }

    #[test]
    fn test_event_marker_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-start");

        let mut synth = Synthesizer::new(Role::SourceOwner, EventStore::load(&path));
        synth.synthesize(&cycle(&[("I", "-60000")]), at(5_000));
        assert_eq!(fs::read_to_string(&path).unwrap(), "5000");

        let restored = EventStore::load(&path);
        assert_eq!(restored.last_start(), Some(5_000));

        let mut synth = Synthesizer::new(Role::SourceOwner, restored);
        let out = synth.synthesize(&cycle(&[("I", "0")]), at(5_000 + 600));
        assert_eq!(find(&out, EVENT_KEY).unwrap().numeric, Some(10));
    }

    #[test]
    fn test_corrupt_marker_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event-start");
        fs::write(&path, "not a number").unwrap();
        assert_eq!(EventStore::load(&path).last_start(), None);
    }
}
