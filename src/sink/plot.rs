//! Plot log: one CSV row per cycle
//!
//! Rows go to `<dir>/<prefix>-<YYYY-MM-DD>.csv` in a fixed column order.
//! Missing fields are written as `nodata` so columns stay aligned. A `#`
//! comment naming the columns starts every file and is repeated once at
//! least [`HEADER_INTERVAL_SECS`] have passed since the last one.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use tracing::info;

use super::{dated_path, open_append, Sink};
use crate::cycle::CycleState;
use crate::error::Result;
use crate::vedirect::catalog::{CURRENT_KEY, EVENT_KEY, POWER_KEY, TIME_KEY, VOLTAGE_KEY};
use crate::vedirect::decoder::TIME_FORMAT;

/// Column order of every row
pub const PLOT_COLUMNS: &[&str] = &[
    TIME_KEY,
    VOLTAGE_KEY,
    CURRENT_KEY,
    POWER_KEY,
    "CE",
    "SOC",
    "TTG",
    "T",
    EVENT_KEY,
];

/// Placeholder for fields absent from a cycle
pub const NO_DATA: &str = "nodata";

/// Minimum spacing of header comments
pub const HEADER_INTERVAL_SECS: i64 = 1800;

struct DatedFile {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

pub struct PlotSink {
    dir: PathBuf,
    prefix: String,
    current: Option<DatedFile>,
    last_header: Option<DateTime<Local>>,
    headers: u64,
}

impl PlotSink {
    pub fn new<P: AsRef<Path>>(dir: P, prefix: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            current: None,
            last_header: None,
            headers: 0,
        }
    }

    /// Header comments written so far
    pub fn headers(&self) -> u64 {
        self.headers
    }

    /// File currently written to
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.path.as_path())
    }

    /// Open the file for `date` unless it is already open
    ///
    /// Returns `true` if a new file was opened.
    fn roll(&mut self, date: NaiveDate) -> Result<bool> {
        if self.current.as_ref().is_some_and(|c| c.date == date) {
            return Ok(false);
        }

        let path = dated_path(&self.dir, &self.prefix, date, "csv");
        let file = open_append(&path)?;
        info!("Plot log: {}", path.display());

        self.current = Some(DatedFile { date, path, file });
        Ok(true)
    }
}

impl Sink for PlotSink {
    fn name(&self) -> &'static str {
        "plot"
    }

    fn flush_cycle(&mut self, cycle: &CycleState, now: DateTime<Local>) -> Result<()> {
        // The owner's capture time, so every subscriber rolls identically
        let stamp = cycle
            .numeric(TIME_KEY)
            .and_then(|epoch| Local.timestamp_opt(epoch, 0).single())
            .unwrap_or(now);

        let new_file = self.roll(stamp.date_naive())?;
        let header_due = self
            .last_header
            .map_or(true, |t| (stamp - t).num_seconds() >= HEADER_INTERVAL_SECS);

        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };

        if new_file || header_due {
            writeln!(
                current.file,
                "# {} vedirect-mon {}: {}",
                stamp.format(TIME_FORMAT),
                env!("CARGO_PKG_VERSION"),
                PLOT_COLUMNS.join(",")
            )?;
            self.last_header = Some(stamp);
            self.headers += 1;
        }

        let row: Vec<String> = PLOT_COLUMNS
            .iter()
            .map(|key| {
                cycle
                    .get(key)
                    .map(|m| m.value_text())
                    .unwrap_or_else(|| NO_DATA.to_string())
            })
            .collect();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut current.file);
        writer.write_record(&row)?;
        writer.flush()?;
        Ok(())
    }
}
