//! # Error Types
//!
//! Custom error types for vedirect-mon using `thiserror`.

use thiserror::Error;

/// Main error type for vedirect-mon
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Reader lost the record framing and could not resynchronize
    #[error("Lost frame after {attempts} consecutive malformed lines, last bytes: {}", hex_dump(.raw))]
    OutOfFrame {
        /// Number of consecutive malformed lines seen
        attempts: u32,
        /// The offending raw line
        raw: Vec<u8>,
    },

    /// A numeric field carried a value that does not parse
    #[error("Invalid value {value:?} for field {key}")]
    InvalidValue { key: String, value: String },

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No usable serial device
    #[error("No VE.Direct device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Relay socket errors
    #[error("Relay error: {0}")]
    Relay(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// CSV errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vedirect-mon
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Render bytes as space separated upper-case hex pairs
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
