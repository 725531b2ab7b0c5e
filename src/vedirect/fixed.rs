//! # Fixed-Point Formatting
//!
//! VE.Direct reports every quantity as an integer in a small unit (mV, mA,
//! 0.1 %, 0.01 kWh). Values are rendered by splitting the integer into a
//! whole part and a fractional part; no floating point is involved, so a
//! rendered value always parses back to the exact raw integer.

use std::fmt;

/// A raw integer split at a decimal scale
///
/// `scale` is the number of decimal digits the raw value is shifted by
/// (3 for milli-units), `precision` is the number of fractional digits
/// rendered. `precision` is never smaller than `scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    pub negative: bool,
    pub whole: u64,
    pub frac: u64,
    pub scale: u32,
    pub precision: u32,
}

impl FixedPoint {
    /// Split a raw integer
    ///
    /// # Examples
    ///
    /// ```
    /// use vedirect_mon::vedirect::fixed::FixedPoint;
    ///
    /// assert_eq!(FixedPoint::from_raw(12358, 3, 3).to_string(), "12.358");
    /// assert_eq!(FixedPoint::from_raw(-254, 3, 3).to_string(), "-0.254");
    /// assert_eq!(FixedPoint::from_raw(876, 1, 2).to_string(), "87.60");
    /// ```
    pub fn from_raw(raw: i64, scale: u32, precision: u32) -> Self {
        let precision = precision.max(scale);
        let abs = raw.unsigned_abs();
        let divisor = 10u64.pow(scale);
        let widen = 10u64.pow(precision - scale);

        Self {
            negative: raw < 0,
            whole: abs / divisor,
            frac: (abs % divisor) * widen,
            scale,
            precision,
        }
    }

    /// Recover the raw integer
    pub fn to_raw(&self) -> i64 {
        let divisor = 10u64.pow(self.scale);
        let widen = 10u64.pow(self.precision - self.scale);
        let abs = (self.whole * divisor + self.frac / widen) as i64;
        if self.negative {
            -abs
        } else {
            abs
        }
    }

    /// Parse a rendered value back at the given scale and precision
    ///
    /// Returns `None` if the text is not a number rendered with exactly
    /// `precision` fractional digits.
    pub fn parse(text: &str, scale: u32, precision: u32) -> Option<Self> {
        let precision = precision.max(scale);
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) if precision > 0 && f.len() == precision as usize => {
                (w.parse().ok()?, f.parse().ok()?)
            }
            None if precision == 0 => (digits.parse().ok()?, 0),
            _ => return None,
        };

        Some(Self {
            negative: negative && (whole != 0 || frac != 0),
            whole,
            frac,
            scale,
            precision,
        })
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        if self.precision == 0 {
            write!(f, "{}", self.whole)
        } else {
            write!(
                f,
                "{}.{:0width$}",
                self.whole,
                self.frac,
                width = self.precision as usize
            )
        }
    }
}

/// Unit of a duration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
}

/// Text rendered for negative durations
pub const INFINITE: &str = "infinite";

/// Split a duration into days, hours, minutes and (for seconds) seconds
///
/// Days are omitted when zero. A negative value means the device does not
/// know (e.g. time-to-go while charging) and renders as `"infinite"`.
///
/// # Examples
///
/// ```
/// use vedirect_mon::vedirect::fixed::{split_time, TimeUnit};
///
/// assert_eq!(split_time(90061, TimeUnit::Seconds), "1d 1h 1m 1s");
/// assert_eq!(split_time(125, TimeUnit::Minutes), "2h 5m");
/// assert_eq!(split_time(-1, TimeUnit::Minutes), "infinite");
/// ```
pub fn split_time(value: i64, unit: TimeUnit) -> String {
    if value < 0 {
        return INFINITE.to_string();
    }

    let (seconds, mut rest) = match unit {
        TimeUnit::Seconds => (Some(value % 60), value / 60),
        TimeUnit::Minutes => (None, value),
    };
    let minutes = rest % 60;
    rest /= 60;
    let hours = rest % 24;
    let days = rest / 24;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}d ", days));
    }
    out.push_str(&format!("{}h {}m", hours, minutes));
    if let Some(s) = seconds {
        out.push_str(&format!(" {}s", s));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milli_formatting() {
        assert_eq!(FixedPoint::from_raw(12358, 3, 3).to_string(), "12.358");
        assert_eq!(FixedPoint::from_raw(5, 3, 3).to_string(), "0.005");
        assert_eq!(FixedPoint::from_raw(0, 3, 3).to_string(), "0.000");
    }

    #[test]
    fn test_negative_keeps_sign_on_whole_part_only() {
        let fp = FixedPoint::from_raw(-254, 3, 3);
        assert!(fp.negative);
        assert_eq!(fp.whole, 0);
        assert_eq!(fp.frac, 254);
        assert_eq!(fp.to_string(), "-0.254");

        assert_eq!(FixedPoint::from_raw(-12001, 3, 3).to_string(), "-12.001");
    }

    #[test]
    fn test_tenths_and_hundredths() {
        assert_eq!(FixedPoint::from_raw(876, 1, 2).to_string(), "87.60");
        assert_eq!(FixedPoint::from_raw(1000, 1, 2).to_string(), "100.00");
        assert_eq!(FixedPoint::from_raw(12345, 2, 2).to_string(), "123.45");
        assert_eq!(FixedPoint::from_raw(-313, 2, 2).to_string(), "-3.13");
    }

    #[test]
    fn test_integer_precision() {
        assert_eq!(FixedPoint::from_raw(42, 0, 0).to_string(), "42");
        assert_eq!(FixedPoint::from_raw(-7, 0, 0).to_string(), "-7");
    }

    #[test]
    fn test_round_trip_recovers_raw() {
        let cases: &[(i64, u32, u32)] = &[
            (12358, 3, 3),
            (-254, 3, 3),
            (-1, 3, 3),
            (-1000, 3, 3),
            (876, 1, 2),
            (-5, 1, 2),
            (4321, 2, 2),
            (-99999, 2, 2),
            (17, 0, 0),
        ];

        for &(raw, scale, precision) in cases {
            let rendered = FixedPoint::from_raw(raw, scale, precision).to_string();
            let parsed = FixedPoint::parse(&rendered, scale, precision)
                .unwrap_or_else(|| panic!("failed to parse {}", rendered));
            assert_eq!(parsed.to_raw(), raw, "round trip of {} via {}", raw, rendered);
        }
    }

    #[test]
    fn test_parse_rejects_wrong_precision() {
        assert!(FixedPoint::parse("12.35", 3, 3).is_none());
        assert!(FixedPoint::parse("abc", 3, 3).is_none());
        assert!(FixedPoint::parse("12", 3, 3).is_none());
    }

    #[test]
    fn test_split_time_seconds() {
        assert_eq!(split_time(90061, TimeUnit::Seconds), "1d 1h 1m 1s");
        assert_eq!(split_time(59, TimeUnit::Seconds), "0h 0m 59s");
        assert_eq!(split_time(3600, TimeUnit::Seconds), "1h 0m 0s");
    }

    #[test]
    fn test_split_time_minutes() {
        assert_eq!(split_time(0, TimeUnit::Minutes), "0h 0m");
        assert_eq!(split_time(1441, TimeUnit::Minutes), "1d 0h 1m");
    }

    #[test]
    fn test_split_time_negative_is_infinite() {
        assert_eq!(split_time(-1, TimeUnit::Minutes), "infinite");
        assert_eq!(split_time(-1, TimeUnit::Seconds), "infinite");
    }
}
