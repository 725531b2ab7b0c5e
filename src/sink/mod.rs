//! # Sink Dispatch
//!
//! Routes every record and measurement to the enabled sinks and closes
//! cycles.
//!
//! For each record read:
//! 1. If the record's key closes a cycle, the cycle is synthesized, the
//!    synthesized fields are published and dispatched, and every sink is
//!    flushed.
//! 2. The record goes to sinks that want raw input (backup log) and to the
//!    relay publisher.
//! 3. The record is decoded and each measurement goes to every sink.
//!
//! Sinks are independent. A failing sink is warned about and does not
//! affect decoding or the other sinks.

pub mod backup;
pub mod panel;
pub mod plot;
pub mod raw;
pub mod snapshot;

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, warn};

use crate::cycle::{CycleState, CycleTracker};
use crate::error::{MonitorError, Result};
use crate::relay::{Publisher, Role};
use crate::vedirect::catalog::{self, Origin};
use crate::vedirect::decoder::{decode, Decoded, Measurement};
use crate::vedirect::reader::RawRecord;
use crate::vedirect::synth::Synthesizer;

pub use backup::BackupSink;
pub use panel::PanelSink;
pub use plot::PlotSink;
pub use raw::RawSink;
pub use snapshot::SnapshotSink;

/// Consumer of decoded telemetry
pub trait Sink: Send {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Every raw record, before decoding
    fn record(&mut self, _record: &RawRecord, _now: DateTime<Local>) -> Result<()> {
        Ok(())
    }

    /// Every decoded or synthesized measurement
    fn measurement(&mut self, _measurement: &Measurement) -> Result<()> {
        Ok(())
    }

    /// End of a cycle
    fn flush_cycle(&mut self, _cycle: &CycleState, _now: DateTime<Local>) -> Result<()> {
        Ok(())
    }
}

/// Routes records through decoding, synthesis and the sinks
pub struct Dispatcher {
    role: Role,
    tracker: CycleTracker,
    cycle: CycleState,
    synthesizer: Synthesizer,
    sinks: Vec<Box<dyn Sink>>,
    publisher: Option<Box<dyn Publisher>>,
    unknown_keys: HashSet<String>,
    cycles: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("role", &self.role)
            .field("tracker", &self.tracker)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("publishing", &self.publisher.is_some())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(role: Role, synthesizer: Synthesizer) -> Self {
        Self {
            role,
            tracker: CycleTracker::new(),
            cycle: CycleState::new(),
            synthesizer,
            sinks: Vec::new(),
            publisher: None,
            unknown_keys: HashSet::new(),
            cycles: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        debug!("Enabled {} sink", sink.name());
        self.sinks.push(sink);
    }

    /// Attach the relay publisher
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Relay` for subscribers, which must not
    /// republish what they receive.
    pub fn set_publisher(&mut self, publisher: Box<dyn Publisher>) -> Result<()> {
        if self.role != Role::SourceOwner {
            return Err(MonitorError::Relay(
                "only the source owner may publish".to_string(),
            ));
        }
        self.publisher = Some(publisher);
        Ok(())
    }

    /// Number of cycles closed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Handle one record from the reader
    pub fn handle(&mut self, record: RawRecord, now: DateTime<Local>) {
        let eligible = catalog::lookup(&record.key).map_or(true, |spec| spec.origin == Origin::Wire);
        if self.tracker.observe(&record.key, eligible) {
            self.flush_cycle(now);
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.record(&record, now) {
                warn!("{} sink failed on {}: {}", sink.name(), record.key, e);
            }
        }
        self.publish(&record.key, &record.value);

        match decode(&record) {
            Ok(Decoded::Fields(fields)) => {
                for measurement in fields {
                    self.dispatch(measurement);
                }
            }
            Ok(Decoded::Ignored) => {}
            Ok(Decoded::Unknown) => {
                if self.unknown_keys.insert(record.key.clone()) {
                    warn!("Unknown field {:?} (value {:?}), ignoring", record.key, record.value);
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    /// Close the current cycle: synthesize, then flush every sink
    pub fn flush_cycle(&mut self, now: DateTime<Local>) {
        for measurement in self.synthesizer.synthesize(&self.cycle, now) {
            self.publish(measurement.key(), &measurement.raw_value);
            self.dispatch(measurement);
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush_cycle(&self.cycle, now) {
                warn!("{} sink failed to flush: {}", sink.name(), e);
            }
        }

        self.cycle.clear();
        self.cycles += 1;
    }

    /// Flush a partially collected cycle at end of input
    pub fn finish(&mut self, now: DateTime<Local>) {
        if !self.cycle.is_empty() {
            self.flush_cycle(now);
        }
    }

    fn dispatch(&mut self, measurement: Measurement) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.measurement(&measurement) {
                warn!("{} sink failed on {}: {}", sink.name(), measurement.key(), e);
            }
        }
        self.cycle.insert(measurement);
    }

    fn publish(&self, key: &str, value: &str) {
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(key, value) {
                warn!("Relay publish of {} failed: {}", key, e);
            }
        }
    }
}

/// `<dir>/<prefix>-<YYYY-MM-DD>.<ext>`
pub fn dated_path(dir: &Path, prefix: &str, date: NaiveDate, ext: &str) -> PathBuf {
    dir.join(format!("{}-{}.{}", prefix, date.format("%Y-%m-%d"), ext))
}

/// Open a file for appending, creating it and its directory if needed
pub fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
