//! # VE.Direct Field Catalog
//!
//! Static table describing every key the monitor understands: how the raw
//! value is scaled, which unit it is displayed in, and a human description.
//! Keys that never appear on the wire (timestamp, power, alarm text, event
//! elapsed time) live in the same table so every measurement, decoded or
//! synthesized, has exactly one description.

use super::fixed::TimeUnit;

/// Key of the checksum field terminating each block
pub const CHECKSUM_KEY: &str = "Checksum";

/// Synthesized capture timestamp (epoch seconds)
pub const TIME_KEY: &str = "TIME";
/// Synthesized instantaneous power (0.01 W)
pub const POWER_KEY: &str = "PWR";
/// Alarm reasons as text, derived from `AR`
pub const ALARM_TEXT_KEY: &str = "AR_TXT";
/// Minutes since the last heavy-discharge event
pub const EVENT_KEY: &str = "EVT";

/// Battery voltage (mV)
pub const VOLTAGE_KEY: &str = "V";
/// Battery current (mA)
pub const CURRENT_KEY: &str = "I";
/// Alarm reason bitmask
pub const ALARM_KEY: &str = "AR";

/// How a raw value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Millivolts, displayed in V
    MilliVolts,
    /// Milliamps, displayed in A
    MilliAmps,
    /// Milliamp hours, displayed in Ah
    MilliAmpHours,
    /// Tenths of a percent, displayed in %
    PercentTenths,
    /// Hundredths of a kWh, displayed in kWh
    CentiKiloWattHours,
    /// Whole watts
    Watts,
    /// Hundredths of a watt, displayed in W
    CentiWatts,
    /// Whole degrees Celsius
    Celsius,
    /// Duration in minutes
    Minutes,
    /// Duration in seconds
    Seconds,
    /// Plain counter
    Count,
    /// 12-bit alarm reason mask
    AlarmMask,
    /// Hexadecimal product id
    ProductCode,
    /// Unix epoch seconds
    Timestamp,
    /// Free text, shown verbatim
    Text,
    /// Not decoded
    Ignored,
}

impl UnitKind {
    /// Decimal scale and rendered precision for fixed-point kinds
    pub fn fixed(self) -> Option<(u32, u32)> {
        match self {
            UnitKind::MilliVolts | UnitKind::MilliAmps | UnitKind::MilliAmpHours => Some((3, 3)),
            UnitKind::PercentTenths => Some((1, 2)),
            UnitKind::CentiKiloWattHours | UnitKind::CentiWatts => Some((2, 2)),
            UnitKind::Watts | UnitKind::Count | UnitKind::AlarmMask => Some((0, 0)),
            _ => None,
        }
    }

    /// Duration unit for duration kinds
    pub fn time_unit(self) -> Option<TimeUnit> {
        match self {
            UnitKind::Minutes => Some(TimeUnit::Minutes),
            UnitKind::Seconds => Some(TimeUnit::Seconds),
            _ => None,
        }
    }

    /// Unit suffix used for display
    pub fn display_unit(self) -> &'static str {
        match self {
            UnitKind::MilliVolts => "V",
            UnitKind::MilliAmps => "A",
            UnitKind::MilliAmpHours => "Ah",
            UnitKind::PercentTenths => "%",
            UnitKind::CentiKiloWattHours => "kWh",
            UnitKind::Watts | UnitKind::CentiWatts => "W",
            UnitKind::Celsius => "°C",
            _ => "",
        }
    }
}

/// Where a field comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Sent by the device
    Wire,
    /// Produced by the decoder alongside another field
    Derived,
    /// Produced once per cycle by the synthesizer
    Synthesized,
}

/// Static description of one protocol key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: UnitKind,
    pub description: &'static str,
    pub origin: Origin,
}

const fn wire(key: &'static str, kind: UnitKind, description: &'static str) -> FieldSpec {
    FieldSpec { key, kind, description, origin: Origin::Wire }
}

use UnitKind::*;

/// All known fields
pub static CATALOG: &[FieldSpec] = &[
    wire("V", MilliVolts, "Main battery voltage"),
    wire("V2", MilliVolts, "Output 2 voltage"),
    wire("V3", MilliVolts, "Output 3 voltage"),
    wire("VS", MilliVolts, "Auxiliary voltage"),
    wire("VM", MilliVolts, "Mid-point voltage"),
    wire("DM", PercentTenths, "Mid-point deviation"),
    wire("VPV", MilliVolts, "Panel voltage"),
    wire("PPV", Watts, "Panel power"),
    wire("I", MilliAmps, "Battery current"),
    wire("I2", MilliAmps, "Output 2 current"),
    wire("I3", MilliAmps, "Output 3 current"),
    wire("IL", MilliAmps, "Load current"),
    wire("LOAD", Text, "Load output state"),
    wire("T", Celsius, "Battery temperature"),
    wire("P", Watts, "Instantaneous power (device)"),
    wire("CE", MilliAmpHours, "Consumed charge"),
    wire("SOC", PercentTenths, "State of charge"),
    wire("TTG", Minutes, "Time to go"),
    wire("Alarm", Text, "Alarm condition active"),
    wire("Relay", Text, "Relay state"),
    wire(ALARM_KEY, AlarmMask, "Alarm reason"),
    wire("OR", Text, "Off reason"),
    wire("H1", MilliAmpHours, "Deepest discharge"),
    wire("H2", MilliAmpHours, "Last discharge"),
    wire("H3", MilliAmpHours, "Average discharge"),
    wire("H4", Count, "Charge cycles"),
    wire("H5", Count, "Full discharges"),
    wire("H6", MilliAmpHours, "Cumulative charge drawn"),
    wire("H7", MilliVolts, "Minimum battery voltage"),
    wire("H8", MilliVolts, "Maximum battery voltage"),
    wire("H9", Seconds, "Time since last full charge"),
    wire("H10", Count, "Automatic synchronizations"),
    wire("H11", Count, "Low voltage alarms"),
    wire("H12", Count, "High voltage alarms"),
    wire("H13", Count, "Low auxiliary voltage alarms"),
    wire("H14", Count, "High auxiliary voltage alarms"),
    wire("H15", MilliVolts, "Minimum auxiliary voltage"),
    wire("H16", MilliVolts, "Maximum auxiliary voltage"),
    wire("H17", CentiKiloWattHours, "Discharged energy"),
    wire("H18", CentiKiloWattHours, "Charged energy"),
    wire("H19", CentiKiloWattHours, "Yield total"),
    wire("H20", CentiKiloWattHours, "Yield today"),
    wire("H21", Watts, "Maximum power today"),
    wire("H22", CentiKiloWattHours, "Yield yesterday"),
    wire("H23", Watts, "Maximum power yesterday"),
    wire("ERR", Count, "Error code"),
    wire("CS", Count, "State of operation"),
    wire("MPPT", Count, "Tracker operation mode"),
    wire("MODE", Count, "Device mode"),
    wire("HSDS", Count, "Day sequence number"),
    wire("FW", Text, "Firmware version"),
    wire("PID", ProductCode, "Product"),
    wire("SER#", Text, "Serial number"),
    wire("BMV", Ignored, "Model description"),
    wire(CHECKSUM_KEY, Ignored, "Checksum"),
    FieldSpec {
        key: TIME_KEY,
        kind: Timestamp,
        description: "Captured at",
        origin: Origin::Synthesized,
    },
    FieldSpec {
        key: POWER_KEY,
        kind: CentiWatts,
        description: "Power",
        origin: Origin::Synthesized,
    },
    FieldSpec {
        key: EVENT_KEY,
        kind: Minutes,
        description: "Since last heavy discharge",
        origin: Origin::Synthesized,
    },
    FieldSpec {
        key: ALARM_TEXT_KEY,
        kind: Text,
        description: "Alarm reasons",
        origin: Origin::Derived,
    },
];

/// Look up a key
pub fn lookup(key: &str) -> Option<&'static FieldSpec> {
    CATALOG.iter().find(|spec| spec.key == key)
}

/// Alarm reason names, indexed by bit number
pub const ALARM_REASONS: [&str; 12] = [
    "lowV", "highV", "low%", "lowVs", "highVs", "lowT", "highT", "midV", "overload", "DCripple",
    "lowVac", "highVac",
];

/// Comma-joined names of the bits set in an alarm mask
///
/// Returns `None` when no known bit is set.
pub fn alarm_reasons(mask: u32) -> Option<String> {
    let names: Vec<&str> = ALARM_REASONS
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, name)| *name)
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names.join(","))
    }
}

/// Human name of a product id
pub fn product_name(pid: u32) -> &'static str {
    match pid {
        0x0203..=0x0205 | 0xA381..=0xA383 => "BMV-70X",
        0x0300 | 0xA040..=0xA0FF => "BlueSolar MPPT",
        0xA201..=0xA2FF => "Phoenix Inverter",
        _ => "Unknown product",
    }
}
