//! A [`Transport`] driven by a background poller that turns reads into [`Event`]s

use crate::{
    config::{LineConfig, PollConfig},
    error::{Error, Result},
    events::{Event, Events, Sink, Subscription},
    transport::{Backend, Transport},
    NativeBackend,
};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, ThreadId},
};
use tracing::{debug, error, trace, warn};

/// A serial port that reports received data as events.
///
/// A `Port` is created closed. [`Port::open`] opens the device and spawns a thread which reads
/// the device every [`PollConfig::interval`]. Each non empty read becomes one [`Event::Data`].
/// When a read fills the whole scratch buffer the poller reads again straight away, up to
/// [`PollConfig::max_drain`] reads per tick; anything left waits for the next tick. Under a
/// sustained full rate stream every tick therefore runs to the cap.
///
/// Events go to the handler registered with [`Port::on_event`], or when there is none, to the
/// stream returned by [`Port::events`].
///
/// Open and close are atomic to callers on other threads: an `open` racing a `close` waits
/// for the close to finish, and the port reports itself open until it has. A handler running on
/// the poller thread may call `close` or `open` on its own port; while that port is being closed
/// by another thread both calls return straight away.
///
/// Dropping the port closes it.
pub struct Port<B: Backend = NativeBackend> {
    config: LineConfig,
    poll: PollConfig,
    transport: Arc<Transport<B>>,
    sink: Arc<Sink>,
    lifecycle: Mutex<Lifecycle>,
    settled: Condvar,
    events_taken: AtomicBool,
}

enum Lifecycle {
    Closed,
    Open(Poller),
    /// Being torn down, the id is the poller thread being stopped
    Closing(ThreadId),
}

struct Poller {
    stop: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl Poller {
    fn stop(self) {
        // Disconnecting the channel wakes the poller
        drop(self.stop);
        if self.join_handle.thread().id() == thread::current().id() {
            // Closed from inside a handler, the loop exits once the handler returns
            trace!("poller stopping itself");
            return;
        }
        if let Err(error) = self.join_handle.join() {
            error!(?error, "poller join error");
        }
    }
}

impl<B: Backend> Debug for Port<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("config", &self.config)
            .field("poll", &self.poll)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Port<NativeBackend> {
    /// A closed port for the device described by `config`
    pub fn new(config: LineConfig) -> Self {
        Port::with_transport(config, Transport::new())
    }
}

impl<B: Backend> Port<B> {
    /// A closed port which reaches the device through `backend`
    pub fn with_backend(config: LineConfig, backend: B) -> Self {
        Port::with_transport(config, Transport::with_backend(backend))
    }

    /// A closed port over an existing (closed) transport
    pub fn with_transport(config: LineConfig, transport: Transport<B>) -> Self {
        Port {
            config,
            poll: PollConfig::default(),
            transport: Arc::new(transport),
            sink: Arc::new(Sink::default()),
            lifecycle: Mutex::new(Lifecycle::Closed),
            settled: Condvar::new(),
            events_taken: AtomicBool::new(false),
        }
    }

    /// Replace the poller settings. Takes effect on the next [`Port::open`].
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// The line settings
    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// The poller settings
    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// The underlying transport
    pub fn transport(&self) -> &Transport<B> {
        &self.transport
    }

    /// True from a successful [`Port::open`] until [`Port::close`] has returned
    pub fn is_open(&self) -> bool {
        !matches!(*self.lifecycle.lock(), Lifecycle::Closed)
    }

    /// Wait out a close running on another thread. Returns false when the caller is the poller
    /// thread of that close, which must not wait for itself.
    fn settle(&self, state: &mut MutexGuard<'_, Lifecycle>) -> bool {
        while let Lifecycle::Closing(poller) = **state {
            if poller == thread::current().id() {
                return false;
            }
            self.settled.wait(state);
        }
        true
    }

    /// Open the device and start polling. Does nothing if the port is already open.
    pub fn open(&self) -> Result<()> {
        let mut state = self.lifecycle.lock();
        if !self.settle(&mut state) || matches!(*state, Lifecycle::Open(_)) {
            return Ok(());
        }
        self.transport.open(&self.config)?;
        let (stop, stopped) = channel::bounded(0);
        let transport = Arc::clone(&self.transport);
        let sink = Arc::clone(&self.sink);
        let opts = self.poll;
        let spawned = thread::Builder::new()
            .name(format!("poll {}", self.config.device()))
            .spawn(move || poll_loop(transport, sink, opts, stopped));
        match spawned {
            Ok(join_handle) => {
                *state = Lifecycle::Open(Poller { stop, join_handle });
                Ok(())
            }
            Err(source) => {
                self.transport.close();
                Err(Error::open(self.config.device(), source))
            }
        }
    }

    /// Stop polling, restore the device settings and release it. Closing a closed port does
    /// nothing.
    pub fn close(&self) {
        let mut state = self.lifecycle.lock();
        if !self.settle(&mut state) {
            return;
        }
        let poller = match std::mem::replace(&mut *state, Lifecycle::Closed) {
            Lifecycle::Open(poller) => poller,
            _ => return,
        };
        *state = Lifecycle::Closing(poller.join_handle.thread().id());
        // The lock is released while joining, a handler running on the poller may still look
        // at the port
        MutexGuard::unlocked(&mut state, || {
            poller.stop();
            self.transport.close();
        });
        *state = Lifecycle::Closed;
        self.settled.notify_all();
        debug!(device = self.config.device(), "port closed");
    }

    /// Send all of `buf`. See [`Transport::write_bytes`].
    pub fn send_bytes(&self, buf: &[u8]) -> Result<usize> {
        self.transport.write_bytes(buf)
    }

    /// Send a single byte
    pub fn send_byte(&self, value: u8) -> Result<usize> {
        self.transport.write_byte(value)
    }

    /// Send a 16 bit word in the build's byte order, see [`crate::word_to_bytes`]
    pub fn send_word(&self, value: u16) -> Result<usize> {
        self.transport.write_word(value)
    }

    /// The stream of events delivered while no handler is registered. Only the first call
    /// returns a stream.
    pub fn events(&self) -> Option<Events> {
        match self.events_taken.swap(true, Ordering::AcqRel) {
            true => None,
            false => Some(Events {
                sink: Arc::clone(&self.sink),
            }),
        }
    }

    /// Deliver events to `handler` on the poller thread instead of the event stream. A later
    /// registration replaces this one.
    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.sink.subscribe(Box::new(handler))
    }

    /// Remove a handler. Returns false if `token` was already replaced or removed.
    pub fn unsubscribe(&self, token: Subscription) -> bool {
        self.sink.unsubscribe(token)
    }
}

impl<B: Backend> Drop for Port<B> {
    fn drop(&mut self) {
        self.close();
        self.sink.queue.done();
    }
}

fn poll_loop<B: Backend>(
    transport: Arc<Transport<B>>,
    sink: Arc<Sink>,
    opts: PollConfig,
    stop: Receiver<()>,
) {
    trace!(
        interval = ?opts.interval(),
        capacity = opts.capacity(),
        "polling"
    );
    let ticker = channel::tick(opts.interval());
    let mut scratch = vec![0; opts.capacity()];
    loop {
        channel::select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                drain(&transport, &mut scratch, opts.max_drain(), |ev| sink.emit(ev));
            }
        }
    }
    trace!("poller finished");
}

/// Run one poll tick. Reads into `scratch` and hands every non empty read to `emit`, reading
/// again while reads fill `scratch`, at most `max_drain` times. Returns the number of reads.
pub(crate) fn drain<B: Backend>(
    transport: &Transport<B>,
    scratch: &mut [u8],
    max_drain: usize,
    mut emit: impl FnMut(Event),
) -> usize {
    for reads in 1..=max_drain {
        match transport.read_nonblocking(scratch) {
            // Closed underneath us, the poller is about to be stopped
            Err(Error::NotOpen) => return reads,
            Err(error) => {
                warn!(?error, "poll failed");
                emit(Event::Error(error));
                return reads;
            }
            Ok(0) => return reads,
            Ok(n) => {
                trace!(len = n, "received");
                emit(Event::Data(scratch[..n].to_vec()));
                if n < scratch.len() {
                    return reads;
                }
            }
        }
    }
    trace!(max_drain, "drain cap reached");
    max_drain
}
