//! Live terminal panel
//!
//! Keeps the latest value of a fixed set of fields and redraws the screen
//! once per cycle.

use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Local};

use super::Sink;
use crate::cycle::CycleState;
use crate::error::Result;
use crate::vedirect::catalog::{
    ALARM_TEXT_KEY, CURRENT_KEY, EVENT_KEY, POWER_KEY, TIME_KEY, VOLTAGE_KEY,
};
use crate::vedirect::decoder::Measurement;

/// Fields shown on the panel, in display order
pub const PANEL_FIELDS: &[&str] = &[
    TIME_KEY,
    VOLTAGE_KEY,
    CURRENT_KEY,
    POWER_KEY,
    "CE",
    "SOC",
    "TTG",
    "H9",
    "T",
    EVENT_KEY,
    ALARM_TEXT_KEY,
];

/// Clear screen and home the cursor
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub struct PanelSink<W> {
    out: W,
    fahrenheit: bool,
    /// Widest description seen so far; never shrinks
    width: usize,
    lines: HashMap<&'static str, (&'static str, String)>,
}

impl<W: Write + Send> PanelSink<W> {
    pub fn new(out: W, fahrenheit: bool) -> Self {
        Self {
            out,
            fahrenheit,
            width: 0,
            lines: HashMap::new(),
        }
    }

    /// Current width of the description column
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write + Send> Sink for PanelSink<W> {
    fn name(&self) -> &'static str {
        "panel"
    }

    fn measurement(&mut self, m: &Measurement) -> Result<()> {
        if !PANEL_FIELDS.contains(&m.key()) {
            return Ok(());
        }
        self.width = self.width.max(m.description().chars().count());
        self.lines
            .insert(m.key(), (m.description(), m.display(self.fahrenheit)));
        Ok(())
    }

    fn flush_cycle(&mut self, _cycle: &CycleState, _now: DateTime<Local>) -> Result<()> {
        self.out.write_all(CLEAR_SCREEN.as_bytes())?;
        for key in PANEL_FIELDS {
            if let Some((description, value)) = self.lines.get(key) {
                writeln!(self.out, "{:<width$}  {}", description, value, width = self.width)?;
            }
        }
        self.out.flush()?;
        self.lines.clear();
        Ok(())
    }
}
