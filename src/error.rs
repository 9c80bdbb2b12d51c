//! Error types for the transport and the polling port.

use std::io;
use thiserror::Error;

/// A specialized `Result` for serial operations
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while configuring, opening or talking to a device
#[derive(Debug, Error)]
pub enum Error {
    /// The device name was empty
    #[error("device name must not be empty")]
    EmptyDeviceName,

    /// The baud rate is not in the platform's supported table
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The device could not be opened or its settings could not be applied
    #[error("failed to open {device}: {source}")]
    Open {
        /// The OS-native device name
        device: String,
        /// The OS diagnostic
        #[source]
        source: io::Error,
    },

    /// A read failed for a reason other than "no data available"
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// A write failed
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// Listing the system serial ports failed
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),

    /// The operation requires an open device
    #[error("port is not open")]
    NotOpen,

    /// The transport already holds a device handle
    #[error("port is already open")]
    AlreadyOpen,

    /// Zero length writes are never passed to the OS
    #[error("refusing to write an empty buffer")]
    EmptyWrite,

    /// The buffer is longer than the transport accepts in a single write
    #[error("write of {len} bytes exceeds the {max} byte limit")]
    WriteTooLarge {
        /// Requested length
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Broad classification of an [`Error`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected while building a configuration, before any OS call
    Configuration,
    /// The device could not be opened or configured
    Open,
    /// An OS level read or write failed
    Io,
    /// The call was not valid in the current state, no OS call was made
    Usage,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyDeviceName | Error::UnsupportedBaudRate(_) => ErrorKind::Configuration,
            Error::Open { .. } => ErrorKind::Open,
            Error::Read(_) | Error::Write(_) | Error::Enumerate(_) => ErrorKind::Io,
            Error::NotOpen | Error::AlreadyOpen | Error::EmptyWrite | Error::WriteTooLarge { .. } => {
                ErrorKind::Usage
            }
        }
    }

    /// The OS diagnostic code (errno or `GetLastError`), when there is one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Open { source, .. } | Error::Read(source) | Error::Write(source) => {
                source.raw_os_error()
            }
            _ => None,
        }
    }

    pub(crate) fn open(device: impl Into<String>, source: io::Error) -> Self {
        Error::Open {
            device: device.into(),
            source,
        }
    }
}
