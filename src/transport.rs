//! The serial transport, one OS handle per instance

use crate::{
    config::LineConfig,
    error::{Error, Result},
    NativeBackend,
};
use parking_lot::RwLock;
use std::{
    fmt::{self, Debug},
    io,
};
use tracing::{debug, trace, warn};

/// Largest buffer accepted by a single write unless changed with [`Transport::with_max_write`]
pub const DEFAULT_MAX_WRITE: usize = 255;

/// An open OS device. The handle owns the settings captured when it was opened.
///
/// Reads and writes may be called concurrently from different threads, they are independent
/// directions on the same descriptor. Dropping a handle must release the OS resource.
pub trait Handle: Send + Sync {
    /// Read whatever is immediately available. May return [`io::ErrorKind::WouldBlock`] or
    /// `Ok(0)` when there is nothing to read.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `buf`, returning how much was accepted
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Put back the settings captured at open time
    fn restore(&mut self) -> io::Result<()>;
}

/// The capability to open a device with some line settings.
///
/// The platform backend is [`NativeBackend`]. On any failure after the OS resource was acquired,
/// `open` must release it before returning.
pub trait Backend: Send + Sync + 'static {
    /// The handle type this backend produces
    type Handle: Handle + 'static;

    /// Open and configure a device: 8 data bits, no flow control, raw input, reads that return
    /// immediately.
    fn open(&self, config: &LineConfig) -> io::Result<Self::Handle>;
}

/// Byte-oriented access to a single serial device.
///
/// The handle sits behind a read-write lock. Reads and writes share it, `open` and `close` take
/// it exclusively, so a close waits for in flight I/O and never races it.
pub struct Transport<B: Backend = NativeBackend> {
    backend: B,
    handle: RwLock<Option<B::Handle>>,
    max_write: usize,
}

impl<B: Backend> Debug for Transport<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("open", &self.is_open())
            .field("max_write", &self.max_write)
            .finish()
    }
}

impl Default for Transport<NativeBackend> {
    fn default() -> Self {
        Transport::new()
    }
}

impl Transport<NativeBackend> {
    /// A closed transport using the platform backend
    pub fn new() -> Self {
        Transport::with_backend(NativeBackend::default())
    }
}

impl<B: Backend> Transport<B> {
    /// A closed transport using `backend` to reach the OS
    pub fn with_backend(backend: B) -> Self {
        Transport {
            backend,
            handle: RwLock::new(None),
            max_write: DEFAULT_MAX_WRITE,
        }
    }

    /// Change the largest buffer accepted by [`Transport::write_bytes`] (at least 1)
    pub fn with_max_write(mut self, max_write: usize) -> Self {
        self.max_write = max_write.max(1);
        self
    }

    /// The backend used to open devices
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Largest single write
    pub fn max_write(&self) -> usize {
        self.max_write
    }

    /// True while a device handle is held
    pub fn is_open(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Open and configure the device named in `config`
    pub fn open(&self, config: &LineConfig) -> Result<()> {
        let mut slot = self.handle.write();
        if slot.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let handle = self
            .backend
            .open(config)
            .map_err(|source| Error::open(config.device(), source))?;
        debug!(
            device = config.device(),
            baud = config.baud_rate(),
            parity = ?config.parity(),
            stop_bits = ?config.stop_bits(),
            "device open"
        );
        *slot = Some(handle);
        Ok(())
    }

    /// Read up to `buf.len()` bytes that are already available. `Ok(0)` means there is nothing
    /// to read right now.
    pub fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(Error::NotOpen)?;
        if buf.is_empty() {
            return Ok(0);
        }
        match handle.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(e) => Err(Error::Read(e)),
        }
    }

    /// Write all of `buf`. Returns `buf.len()` on success.
    ///
    /// Empty buffers and buffers longer than [`Transport::max_write`] are rejected before
    /// reaching the OS. Partial OS writes are continued until everything is sent.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::EmptyWrite);
        }
        if buf.len() > self.max_write {
            return Err(Error::WriteTooLarge {
                len: buf.len(),
                max: self.max_write,
            });
        }
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(Error::NotOpen)?;
        let mut written = 0;
        while written < buf.len() {
            match handle.write(&buf[written..]) {
                Ok(0) => return Err(Error::Write(io::ErrorKind::WriteZero.into())),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Write(e)),
            }
        }
        trace!(len = written, "wrote");
        Ok(written)
    }

    /// Write a single byte
    pub fn write_byte(&self, value: u8) -> Result<usize> {
        self.write_bytes(&[value])
    }

    /// Write a 16 bit word, byte order chosen at build time, see [`word_to_bytes`]
    pub fn write_word(&self, value: u16) -> Result<usize> {
        self.write_bytes(&word_to_bytes(value))
    }

    /// Restore the original device settings and release the handle. Closing a closed
    /// transport does nothing.
    pub fn close(&self) {
        let Some(mut handle) = self.handle.write().take() else {
            return;
        };
        if let Err(error) = handle.restore() {
            warn!(?error, "failed to restore device settings");
        }
        drop(handle);
        debug!("device closed");
    }
}

impl<B: Backend> Drop for Transport<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Split a word into wire order. Least significant byte first, unless the `big-endian` feature
/// is enabled.
pub fn word_to_bytes(value: u16) -> [u8; 2] {
    #[cfg(feature = "big-endian")]
    {
        value.to_be_bytes()
    }
    #[cfg(not(feature = "big-endian"))]
    {
        value.to_le_bytes()
    }
}
