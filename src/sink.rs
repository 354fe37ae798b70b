//! A zero-capacity rendezvous channel.
//!
//! Every send is a hand-off: it only completes once the receiver has taken
//! the element. Any number of [`Sender`]s may exist. The channel is closed by
//! its single [`Closer`], never by the senders going away, so the owner of the
//! `Closer` decides when no more writes can happen.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_core::stream::{FusedStream, Stream};
use slab::Slab;

/// Create a rendezvous channel.
///
/// The channel stays open until the [`Closer`] is closed or dropped.
pub fn channel<T>() -> (Sender<T>, Receiver<T>, Closer<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            slot: None,
            offered: 0,
            taken: 0,
            closed: false,
            receiver_alive: true,
            receiver: None,
            senders: Slab::new(),
        }),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver {
            shared: shared.clone(),
        },
        Closer { shared },
    )
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // No user code runs under the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct State<T> {
    /// The element currently being handed off. `Some` iff `offered == taken + 1`.
    slot: Option<T>,
    offered: u64,
    taken: u64,
    closed: bool,
    receiver_alive: bool,
    receiver: Option<Waker>,
    senders: Slab<Waker>,
}

impl<T> State<T> {
    fn wake_senders(&self) {
        for (_, waker) in self.senders.iter() {
            waker.wake_by_ref();
        }
    }

    fn wake_receiver(&mut self) {
        if let Some(waker) = self.receiver.take() {
            waker.wake();
        }
    }
}

/// The write half of a rendezvous channel.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Hand `item` to the receiver.
    ///
    /// Completes once the receiver has taken the element. Fails, returning the
    /// element, if the channel is closed or the receiver was dropped before
    /// taking it.
    ///
    /// Dropping the returned future after the element was offered does not
    /// withdraw it; the receiver may still get it.
    pub fn send(&self, item: T) -> Handoff<'_, T> {
        Handoff {
            sender: self,
            item: Some(item),
            ticket: None,
            key: None,
        }
    }

    /// Returns `true` once the receiver has been dropped.
    pub fn is_disconnected(&self) -> bool {
        !self.shared.lock().receiver_alive
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// Error returned by [`Sender::send`] when the element could not be delivered.
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("rendezvous channel closed")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Future returned by [`Sender::send`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Handoff<'a, T> {
    sender: &'a Sender<T>,
    item: Option<T>,
    // Value of `offered` once our element went into the slot.
    ticket: Option<u64>,
    key: Option<usize>,
}

// `item` is moved in and out but never pinned.
impl<T> Unpin for Handoff<'_, T> {}

impl<T> Handoff<'_, T> {
    fn register(&mut self, state: &mut State<T>, waker: &Waker) {
        match self.key {
            Some(key) => {
                let slot = &mut state.senders[key];
                if !slot.will_wake(waker) {
                    *slot = waker.clone();
                }
            }
            None => self.key = Some(state.senders.insert(waker.clone())),
        }
    }

    fn deregister(&mut self, state: &mut State<T>) {
        if let Some(key) = self.key.take() {
            state.senders.remove(key);
        }
    }
}

impl<T> Future for Handoff<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let sender = this.sender;
        let mut state = sender.shared.lock();

        match this.ticket {
            Some(ticket) => {
                if state.taken >= ticket {
                    this.deregister(&mut state);
                    return Poll::Ready(Ok(()));
                }
                if !state.receiver_alive {
                    // Not taken yet, so the slot still holds our element.
                    this.deregister(&mut state);
                    return match state.slot.take() {
                        Some(item) => Poll::Ready(Err(SendError(item))),
                        None => Poll::Ready(Ok(())),
                    };
                }
            }
            None => {
                if state.closed || !state.receiver_alive {
                    this.deregister(&mut state);
                    return match this.item.take() {
                        Some(item) => Poll::Ready(Err(SendError(item))),
                        None => Poll::Ready(Ok(())),
                    };
                }
                if state.slot.is_none() {
                    state.slot = this.item.take();
                    state.offered += 1;
                    this.ticket = Some(state.offered);
                    state.wake_receiver();
                }
            }
        }

        this.register(&mut state, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Handoff<'_, T> {
    fn drop(&mut self) {
        if self.key.is_some() {
            let sender = self.sender;
            let mut state = sender.shared.lock();
            self.deregister(&mut state);
        }
    }
}

impl<T> fmt::Debug for Handoff<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("offered", &self.ticket.is_some())
            .finish_non_exhaustive()
    }
}

/// The read half of a rendezvous channel.
///
/// Yields elements in the order their hand-offs were accepted and `None` once
/// the channel is closed. Reading a closed channel keeps returning `None`.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Receive the next element, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<T> {
        core::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Poll for the next element.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut state = self.shared.lock();

        if let Some(item) = state.slot.take() {
            state.taken += 1;
            state.wake_senders();
            return Poll::Ready(Some(item));
        }
        if state.closed {
            return Poll::Ready(None);
        }

        match &mut state.receiver {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            receiver => *receiver = Some(cx.waker().clone()),
        }
        Poll::Pending
    }

    /// Returns `true` if the channel is closed and nothing is left to read.
    pub fn is_closed(&self) -> bool {
        let state = self.shared.lock();
        state.closed && state.slot.is_none()
    }
}

impl<T> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl<T> FusedStream for Receiver<T> {
    fn is_terminated(&self) -> bool {
        self.is_closed()
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.receiver_alive = false;
        state.receiver = None;
        state.wake_senders();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The close capability of a rendezvous channel.
///
/// There is exactly one per channel. Closing consumes it, and dropping it
/// closes the channel as well.
pub struct Closer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Closer<T> {
    /// Close the channel. Pending and future reads observe the end once any
    /// element already in flight has been taken.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for Closer<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.closed = true;
        state.wake_receiver();
        state.wake_senders();
    }
}

impl<T> fmt::Debug for Closer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer").finish_non_exhaustive()
    }
}
