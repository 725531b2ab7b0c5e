//! # Field Decoder
//!
//! Turns a raw `(key, value)` record into typed, unit-scaled measurements
//! using the field catalog.

use chrono::{Local, TimeZone};

use super::catalog::{self, FieldSpec, UnitKind, ALARM_TEXT_KEY};
use super::fixed::{split_time, FixedPoint};
use super::reader::RawRecord;
use crate::error::{MonitorError, Result};

/// Timestamp rendering used for display and logs
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Scaled representation of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scaled {
    /// Integer split at a decimal scale
    Fixed(FixedPoint),
    /// Whole degrees Celsius
    Celsius(i64),
    /// Duration, already split into days/hours/minutes
    Duration(String),
    /// Text
    Text(String),
}

/// One decoded field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub spec: &'static FieldSpec,
    /// Value exactly as received (or synthesized)
    pub raw_value: String,
    /// Raw value as an integer, for numeric kinds
    pub numeric: Option<i64>,
    pub scaled: Scaled,
}

impl Measurement {
    pub fn key(&self) -> &'static str {
        self.spec.key
    }

    pub fn description(&self) -> &'static str {
        self.spec.description
    }

    /// Value in the original unit, without a unit suffix
    ///
    /// This is what gets logged, snapshotted and compared.
    pub fn value_text(&self) -> String {
        match &self.scaled {
            Scaled::Fixed(fp) => fp.to_string(),
            Scaled::Celsius(c) => c.to_string(),
            Scaled::Duration(s) | Scaled::Text(s) => s.clone(),
        }
    }

    /// Value with unit suffix for on-screen display
    ///
    /// Temperatures are converted to Fahrenheit (integer truncation) when
    /// asked; the stored value is never converted.
    pub fn display(&self, fahrenheit: bool) -> String {
        if let Scaled::Celsius(c) = self.scaled {
            return match fahrenheit.then(|| to_fahrenheit(c)).flatten() {
                Some(f) => format!("{} °F", f),
                None => format!("{} °C", c),
            };
        }

        let unit = self.spec.kind.display_unit();
        if unit.is_empty() {
            self.value_text()
        } else {
            format!("{} {}", self.value_text(), unit)
        }
    }
}

/// Whole degrees Fahrenheit, truncated toward zero after the offset
///
/// `None` if the value is out of range.
fn to_fahrenheit(celsius: i64) -> Option<i64> {
    Some(celsius.checked_mul(9)?.checked_add(160)? / 5)
}

/// Outcome of decoding one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// One or more measurements (alarm masks also yield their text)
    Fields(Vec<Measurement>),
    /// Known field that carries no data
    Ignored,
    /// Key not in the catalog
    Unknown,
}

/// Decode a raw record
///
/// # Errors
///
/// Returns `MonitorError::InvalidValue` if a numeric field does not carry
/// a number. Callers treat this as recoverable.
pub fn decode(record: &RawRecord) -> Result<Decoded> {
    let Some(spec) = catalog::lookup(&record.key) else {
        return Ok(Decoded::Unknown);
    };

    if spec.kind == UnitKind::Ignored {
        return Ok(Decoded::Ignored);
    }

    let measurement = decode_value(spec, &record.value)?;
    let mut fields = Vec::with_capacity(2);

    if spec.kind == UnitKind::AlarmMask {
        let mask = measurement.numeric.unwrap_or(0);
        if let Some(text) = u32::try_from(mask).ok().and_then(catalog::alarm_reasons) {
            if let Some(text_spec) = catalog::lookup(ALARM_TEXT_KEY) {
                fields.push(measurement);
                fields.push(Measurement {
                    spec: text_spec,
                    raw_value: text.clone(),
                    numeric: None,
                    scaled: Scaled::Text(text),
                });
                return Ok(Decoded::Fields(fields));
            }
        }
    }

    fields.push(measurement);
    Ok(Decoded::Fields(fields))
}

/// Decode a value for a known field
///
/// Used by the decoder for wire fields and by the synthesizer for fields
/// it computes, so both render identically.
pub fn decode_value(spec: &'static FieldSpec, raw: &str) -> Result<Measurement> {
    let invalid = || MonitorError::InvalidValue {
        key: spec.key.to_string(),
        value: raw.to_string(),
    };

    let (numeric, scaled) = match spec.kind {
        UnitKind::Text | UnitKind::Ignored => (None, Scaled::Text(raw.to_string())),
        UnitKind::ProductCode => {
            let digits = raw
                .strip_prefix("0x")
                .or_else(|| raw.strip_prefix("0X"))
                .unwrap_or(raw);
            let pid = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
            (
                Some(i64::from(pid)),
                Scaled::Text(catalog::product_name(pid).to_string()),
            )
        }
        UnitKind::Timestamp => {
            let epoch: i64 = raw.trim().parse().map_err(|_| invalid())?;
            let when = Local
                .timestamp_opt(epoch, 0)
                .single()
                .ok_or_else(invalid)?;
            (Some(epoch), Scaled::Text(when.format(TIME_FORMAT).to_string()))
        }
        kind => {
            let value: i64 = raw.trim().parse().map_err(|_| invalid())?;
            let scaled = if let Some((scale, precision)) = kind.fixed() {
                Scaled::Fixed(FixedPoint::from_raw(value, scale, precision))
            } else if let Some(unit) = kind.time_unit() {
                Scaled::Duration(split_time(value, unit))
            } else {
                Scaled::Celsius(value)
            };
            (Some(value), scaled)
        }
    };

    Ok(Measurement {
        spec,
        raw_value: raw.to_string(),
        numeric,
        scaled,
    })
}
