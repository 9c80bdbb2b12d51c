//! serialport-poll is a small cross platform serial transport with a polling event adapter
//!
//! # Feature Overview
//!
//! A [`Transport`] opens one serial device, configures it for 8 data bits with the requested
//! baud rate, parity and stop bits, and gives back the original settings when it is closed.
//! Reads never block: they return whatever the OS has buffered, possibly nothing. Writes send the
//! whole buffer.
//!
//! A [`Port`] wraps a transport and spawns a thread for each open device which polls it on a
//! fixed interval. Received data is delivered as [`Event`]s, either to a handler or through an
//! async [`Events`] stream. This is considered appropriate because the number of serial ports
//! connected to a system is considered small.
//!
//! The OS layer is a [`Backend`]. [`NativeBackend`] uses termios on Unix and the COM port API on
//! Windows, [`LoopbackBackend`] is an in-memory device for tests.
//!
//! 16 bit words are sent least significant byte first. Enable the `big-endian` feature to send
//! the most significant byte first.

#![deny(
    clippy::dbg_macro,
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]
// Document feature-gated elements on docs.rs. See
// https://doc.rust-lang.org/rustdoc/unstable-features.html?highlight=doc(cfg#doccfg-recording-what-platforms-or-features-are-required-for-code-to-be-present
// and
// https://doc.rust-lang.org/rustdoc/unstable-features.html#doc_auto_cfg-automatically-generate-doccfg
// for details.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// Don't worry about needing to `unwrap()` or otherwise handle some results in
// doc tests.
#![doc(test(attr(allow(unused_must_use))))]

mod config;
mod error;
mod events;
mod hex;
mod loopback;
mod port;
mod transport;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
mod posix;

pub use config::{
    LineConfig, Parity, PollConfig, StopBits, DEFAULT_MAX_DRAIN, DEFAULT_POLL_CAPACITY,
    DEFAULT_POLL_INTERVAL, SUPPORTED_BAUD_RATES,
};
pub use error::{Error, ErrorKind, Result};
pub use events::{Event, Events, Subscription};
pub use hex::{ascii_to_hex, hex_to_ascii};
pub use loopback::{LoopbackBackend, LoopbackHandle, Stats};
pub use port::Port;
pub use transport::{word_to_bytes, Backend, Handle, Transport, DEFAULT_MAX_WRITE};

#[cfg(unix)]
pub use posix::{PosixBackend as NativeBackend, PosixHandle};

#[cfg(windows)]
pub use windows::{WindowsBackend as NativeBackend, WindowsHandle};

/// Names of the serial devices present on the system, ie COM3 or /dev/ttyUSB0
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect();
    Ok(ports)
}
