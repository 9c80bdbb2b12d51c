//! An in-memory device whose transmit line is wired to its receive line.
//!
//! Useful to exercise a [`crate::Port`] without hardware. Every byte written comes back on the
//! next read, extra bytes can be injected as if they arrived from the wire, and failures can be
//! scripted. Counters record every call that would have reached the OS. Reads and writes can
//! be held at a gate to simulate a call blocked in the OS.

use crate::{
    config::LineConfig,
    transport::{Backend, Handle},
};
use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, io, sync::Arc};
use tracing::trace;

/// Number of calls that reached the simulated device
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Successful opens
    pub opens: usize,
    /// Read calls
    pub reads: usize,
    /// Write calls
    pub writes: usize,
    /// Settings restorations
    pub restores: usize,
    /// Handles released
    pub releases: usize,
}

#[derive(Debug, Default)]
struct State {
    rx: VecDeque<u8>,
    stats: Stats,
    open_error: Option<io::Error>,
    read_error: Option<io::Error>,
    restore_fails: bool,
    write_limit: Option<usize>,
}

/// Parks calls while held
#[derive(Debug, Default)]
struct Gate {
    held: Mutex<bool>,
    released: Condvar,
}

impl Gate {
    fn set(&self, held: bool) {
        *self.held.lock() = held;
        if !held {
            self.released.notify_all();
        }
    }

    fn pass(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
    }
}

/// A simulated device. Clones share the same wire.
#[derive(Debug, Default, Clone)]
pub struct LoopbackBackend {
    state: Arc<Mutex<State>>,
    reads: Arc<Gate>,
    writes: Arc<Gate>,
}

impl LoopbackBackend {
    /// An idle device with nothing buffered
    pub fn new() -> LoopbackBackend {
        LoopbackBackend::default()
    }

    /// Queue bytes as if they were received from the wire
    pub fn inject(&self, data: &[u8]) {
        self.state.lock().rx.extend(data);
    }

    /// Bytes waiting to be read
    pub fn pending(&self) -> usize {
        self.state.lock().rx.len()
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> Stats {
        self.state.lock().stats
    }

    /// Make the next open fail with `error`
    pub fn fail_next_open(&self, error: io::Error) {
        self.state.lock().open_error = Some(error);
    }

    /// Make the next read fail with an error of `kind`
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.fail_next_read_with(kind.into());
    }

    /// Make the next read fail with `error`
    pub fn fail_next_read_with(&self, error: io::Error) {
        self.state.lock().read_error = Some(error);
    }

    /// Make restoring the settings fail from now on
    pub fn fail_restore(&self) {
        self.state.lock().restore_fails = true;
    }

    /// Accept at most `limit` bytes per write call
    pub fn limit_writes(&self, limit: usize) {
        self.state.lock().write_limit = Some(limit.max(1));
    }

    /// Park every read after it is counted, until [`LoopbackBackend::release_reads`]
    pub fn hold_reads(&self) {
        self.reads.set(true);
    }

    /// Let parked and future reads through
    pub fn release_reads(&self) {
        self.reads.set(false);
    }

    /// Park every write after it is counted, until [`LoopbackBackend::release_writes`]
    pub fn hold_writes(&self) {
        self.writes.set(true);
    }

    /// Let parked and future writes through
    pub fn release_writes(&self) {
        self.writes.set(false);
    }
}

impl Backend for LoopbackBackend {
    type Handle = LoopbackHandle;

    fn open(&self, config: &LineConfig) -> io::Result<LoopbackHandle> {
        let mut state = self.state.lock();
        if let Some(error) = state.open_error.take() {
            return Err(error);
        }
        state.stats.opens += 1;
        trace!(device = config.device(), "loopback open");
        Ok(LoopbackHandle {
            state: Arc::clone(&self.state),
            reads: Arc::clone(&self.reads),
            writes: Arc::clone(&self.writes),
        })
    }
}

/// An open handle on a [`LoopbackBackend`]
#[derive(Debug)]
pub struct LoopbackHandle {
    state: Arc<Mutex<State>>,
    reads: Arc<Gate>,
    writes: Arc<Gate>,
}

impl Handle for LoopbackHandle {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.state.lock().stats.reads += 1;
        self.reads.pass();
        let mut state = self.state.lock();
        if let Some(error) = state.read_error.take() {
            return Err(error);
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.state.lock().stats.writes += 1;
        self.writes.pass();
        let mut state = self.state.lock();
        let n = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.rx.extend(&buf[..n]);
        Ok(n)
    }

    fn restore(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.stats.restores += 1;
        match state.restore_fails {
            true => Err(io::Error::other("restore refused")),
            false => Ok(()),
        }
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        self.state.lock().stats.releases += 1;
    }
}
