//! Line and polling configuration

use crate::error::{Error, Result};
use std::time::Duration;

/// Baud rates accepted on POSIX systems
#[cfg(not(windows))]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400,
];

/// Baud rates accepted on Windows
#[cfg(windows)]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    110, 300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 128000, 256000,
];

/// Parity checking
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Number of stop bits
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

/// Device name and line settings. Frames are always 8 data bits.
///
/// A `LineConfig` can only be built with a non empty device name and a baud rate from
/// [`SUPPORTED_BAUD_RATES`], so a transport never sees an invalid one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    device: String,
    baud_rate: u32,
    parity: Parity,
    stop_bits: StopBits,
}

impl LineConfig {
    /// Validate and build a line configuration
    pub fn new(
        device: impl Into<String>,
        baud_rate: u32,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<LineConfig> {
        let device = device.into();
        if device.is_empty() {
            return Err(Error::EmptyDeviceName);
        }
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(Error::UnsupportedBaudRate(baud_rate));
        }
        Ok(LineConfig {
            device,
            baud_rate,
            parity,
            stop_bits,
        })
    }

    /// The OS-native device name, ie COM3 or /dev/ttyUSB0
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Bits per second
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// See [`Parity`]
    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// See [`StopBits`]
    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    /// Always 8
    pub fn data_bits(&self) -> u8 {
        8
    }
}

/// Scratch buffer size used by each poll
pub const DEFAULT_POLL_CAPACITY: usize = 500;

/// Time between two poll ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Saturated reads allowed in one tick before waiting for the next one
pub const DEFAULT_MAX_DRAIN: usize = 64;

/// Options for the background poller of a [`crate::Port`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PollConfig {
    interval: Duration,
    capacity: usize,
    max_drain: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: DEFAULT_POLL_INTERVAL,
            capacity: DEFAULT_POLL_CAPACITY,
            max_drain: DEFAULT_MAX_DRAIN,
        }
    }
}

impl PollConfig {
    /// Set the tick period
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the scratch buffer capacity (at least 1)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set how many reads a single tick may perform while reads keep filling the buffer
    /// (at least 1)
    pub fn with_max_drain(mut self, max_drain: usize) -> Self {
        self.max_drain = max_drain.max(1);
        self
    }

    /// Tick period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Scratch buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read cap per tick
    pub fn max_drain(&self) -> usize {
        self.max_drain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_rate_builds() {
        for &rate in SUPPORTED_BAUD_RATES {
            let config = LineConfig::new("port", rate, Parity::None, StopBits::One).unwrap();
            assert_eq!(config.baud_rate(), rate);
            assert_eq!(config.data_bits(), 8);
        }
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        for rate in [0, 9601, 1_000_000] {
            let err = LineConfig::new("port", rate, Parity::Even, StopBits::Two).unwrap_err();
            assert!(matches!(err, Error::UnsupportedBaudRate(r) if r == rate));
        }
    }

    #[test]
    fn empty_device_is_rejected() {
        let err = LineConfig::new("", 9600, Parity::None, StopBits::One).unwrap_err();
        assert!(matches!(err, Error::EmptyDeviceName));
    }

    #[test]
    fn poll_config_clamps() {
        let config = PollConfig::default().with_capacity(0).with_max_drain(0);
        assert_eq!(config.capacity(), 1);
        assert_eq!(config.max_drain(), 1);
        assert_eq!(PollConfig::default().capacity(), 500);
    }
}
