use crate::utils::rng;

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::Stream;
use pin_project::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// What a [`Select`] observed first.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Event<T> {
    /// The cancellation token fired.
    Cancelled,
    /// The input produced an element.
    Item(T),
    /// The input has no more elements.
    Exhausted,
}

/// Wait for either cancellation or the next element of `input`, whichever
/// comes first.
///
/// Both sides are polled on every wake-up. The order is picked by a coin flip
/// each time, so when both are ready the outcome is not biased either way.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub(crate) struct Select<'a, S: ?Sized> {
    #[pin]
    cancelled: WaitForCancellationFuture<'a>,
    input: &'a mut S,
}

pub(crate) fn select<'a, S>(cancel: &'a CancellationToken, input: &'a mut S) -> Select<'a, S>
where
    S: Stream + Unpin + ?Sized,
{
    Select {
        cancelled: cancel.cancelled(),
        input,
    }
}

impl<S> Future for Select<'_, S>
where
    S: Stream + Unpin + ?Sized,
{
    type Output = Event<S::Item>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        let cancel_first = rng::flip();
        for turn in [cancel_first, !cancel_first] {
            if turn {
                if this.cancelled.as_mut().poll(cx).is_ready() {
                    return Poll::Ready(Event::Cancelled);
                }
            } else {
                match Pin::new(&mut **this.input).poll_next(cx) {
                    Poll::Ready(Some(item)) => return Poll::Ready(Event::Item(item)),
                    Poll::Ready(None) => return Poll::Ready(Event::Exhausted),
                    Poll::Pending => {}
                }
            }
        }

        Poll::Pending
    }
}
