//! # Serial Communication Module
//!
//! Opens the VE.Direct port of a battery monitor or charge controller.
//!
//! VE.Direct text mode is 19,200 baud, 8N1, no flow control. The device
//! transmits unsolicited once per second; nothing is written back.

use crate::error::{MonitorError, Result};
use tokio::io::BufReader;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// VE.Direct baud rate
pub const VEDIRECT_BAUD_RATE: u32 = 19_200;

/// Device paths tried after the configured one (in order of preference)
const FALLBACK_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // VE.Direct to USB cable
    "/dev/ttyACM0", // USB CDC adapters
];

/// VE.Direct serial port
pub struct VeDirectPort {
    /// Buffered serial stream
    port: BufReader<tokio_serial::SerialStream>,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for VeDirectPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeDirectPort")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl VeDirectPort {
    /// Open the configured device, falling back to common paths
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no path could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vedirect_mon::serial::{VeDirectPort, VEDIRECT_BAUD_RATE};
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let port = VeDirectPort::open("/dev/ttyUSB0", VEDIRECT_BAUD_RATE)?;
    ///     println!("Reading from {}", port.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(device: &str, baud_rate: u32) -> Result<Self> {
        let mut paths = vec![device];
        paths.extend(FALLBACK_DEVICE_PATHS.iter().filter(|p| **p != device));
        Self::open_with_paths(&paths, baud_rate)
    }

    /// Open the first path that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Line speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened VE.Direct device at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: BufReader::new(port),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(MonitorError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with VE.Direct settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| MonitorError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Buffered reader over the port, for the frame reader
    pub fn into_reader(self) -> BufReader<tokio_serial::SerialStream> {
        self.port
    }
}
