//! Events produced by the poller, and the queue and stream that deliver them

use crate::error::Error;
use crossbeam::queue::SegQueue;
use futures::Stream;
use parking_lot::Mutex;
use std::{
    fmt::{self, Debug},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll, Waker},
};

/// Something observed by the poller
#[derive(Debug)]
pub enum Event {
    /// The bytes returned by one non empty read
    Data(Vec<u8>),
    /// A read failed. Polling continues on the next tick.
    Error(Error),
}

/// Identifies a handler registered with [`crate::Port::on_event`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
pub(crate) struct Queue {
    inner: SegQueue<Event>,
    done: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl Queue {
    fn maybe_wake(&self) {
        if let Some(waker) = &self.waker.lock().as_ref() {
            waker.wake_by_ref();
        }
    }

    pub(crate) fn push(&self, ev: Event) {
        self.inner.push(ev);
        self.maybe_wake();
    }

    pub(crate) fn done(&self) {
        self.done.store(true, Ordering::Release);
        self.maybe_wake();
    }

    pub(crate) fn try_pop(&self) -> Option<Event> {
        self.inner.pop()
    }

    pub(crate) fn poll_next(&self, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        if let Some(ev) = self.inner.pop() {
            return Poll::Ready(Some(ev));
        }
        {
            let new_waker = cx.waker();
            let mut waker = self.waker.lock();
            *waker = match waker.take() {
                None => Some(new_waker.clone()),
                Some(old_waker) => {
                    if old_waker.will_wake(new_waker) {
                        Some(old_waker)
                    } else {
                        Some(new_waker.clone())
                    }
                }
            };
        }
        // Check again, a push may have happened before the waker was stored
        match self.inner.pop() {
            Some(ev) => Poll::Ready(Some(ev)),
            None if self.done.load(Ordering::Acquire) => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

type Callback = Box<dyn FnMut(Event) + Send>;

#[derive(Default)]
struct HandlerSlot {
    current: u64,
    next: u64,
    callback: Option<Callback>,
}

/// Where the poller delivers events: the registered handler if there is one, otherwise the
/// queue behind [`Events`].
#[derive(Default)]
pub(crate) struct Sink {
    pub(crate) queue: Queue,
    handler: Mutex<HandlerSlot>,
}

impl Sink {
    pub(crate) fn subscribe(&self, callback: Callback) -> Subscription {
        let mut slot = self.handler.lock();
        slot.next += 1;
        slot.current = slot.next;
        slot.callback = Some(callback);
        Subscription(slot.current)
    }

    pub(crate) fn unsubscribe(&self, token: Subscription) -> bool {
        let mut slot = self.handler.lock();
        match slot.current == token.0 && slot.current != 0 {
            true => {
                slot.current = 0;
                slot.callback = None;
                true
            }
            false => false,
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        // The callback runs without the lock held so that it may subscribe, unsubscribe or
        // close its port
        let (token, callback) = {
            let mut slot = self.handler.lock();
            (slot.current, slot.callback.take())
        };
        match callback {
            None => self.queue.push(event),
            Some(mut callback) => {
                callback(event);
                let mut slot = self.handler.lock();
                if slot.current == token && slot.callback.is_none() {
                    slot.callback = Some(callback);
                }
            }
        }
    }
}

/// The stream of [`Event`]s of a [`crate::Port`], see [`crate::Port::events`].
///
/// Events are only queued here while no handler is registered. The stream ends when the port
/// is dropped.
pub struct Events {
    pub(crate) sink: Arc<Sink>,
}

impl Events {
    /// Take the next queued event without waiting
    pub fn try_next(&self) -> Option<Event> {
        self.sink.queue.try_pop()
    }
}

impl Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events").finish()
    }
}

impl Stream for Events {
    type Item = Event;
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.sink.queue.poll_next(cx)
    }
}
