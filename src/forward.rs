//! Forwarding strategies.
//!
//! A strategy moves at most one element from a source to the merged output
//! per call, and tells the calling worker whether it should stop. There are
//! two of them:
//!
//! - A *specialized* strategy implements [`Forward<T>`] for the concrete
//!   element type. The worker drives a typed [`Input<T>`] and a typed
//!   [`Sender<T>`]; nothing is inspected at runtime. [`Typed`] is the stock
//!   implementation.
//! - The *generic* fallback drives a source whose element type was erased
//!   when the worker started. Every element is boxed, checked against the
//!   element type established by validation, then unboxed again on send.
//!
//! Both behave the same. The generic one exists so callers don't have to name
//! a strategy at all; it is noticeably slower per element.

use crate::handle::{ElementType, ErasedInput, Input};
use crate::select::{select, Event};
use crate::sink::Sender;

use core::any::Any;

use futures_core::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// A specialized forwarding strategy for elements of type `T`.
///
/// One call to [`advance`] must:
///
/// 1. wait until either `cancel` fires or `input` has something to report,
///    without favouring either side when both are ready,
/// 2. return `true` if cancellation was observed or `input` is exhausted,
/// 3. otherwise hand the element to `output` and return `false`, or return
///    `true` if `output` no longer has a receiver.
///
/// The worker calls `advance` in a loop until it returns `true`.
///
/// [`advance`]: Forward::advance
///
/// # Examples
///
/// A strategy which drops negative numbers on the floor:
///
/// ```
/// use fan_in::{Forward, Input, Sender};
/// use futures_core::future::BoxFuture;
/// use futures_lite::StreamExt;
/// use tokio_util::sync::CancellationToken;
///
/// struct NonNegative;
///
/// impl Forward<i64> for NonNegative {
///     fn advance<'a>(
///         &'a self,
///         cancel: &'a CancellationToken,
///         input: &'a mut Input<i64>,
///         output: &'a Sender<i64>,
///     ) -> BoxFuture<'a, bool> {
///         Box::pin(async move {
///             tokio::select! {
///                 _ = cancel.cancelled() => true,
///                 next = input.next() => match next {
///                     None => true,
///                     Some(n) if n < 0 => false,
///                     Some(n) => output.send(n).await.is_err(),
///                 },
///             }
///         })
///     }
/// }
/// ```
pub trait Forward<T>: Send + Sync + 'static {
    /// Advance `input` by at most one element. Returns `true` when the worker
    /// should stop.
    fn advance<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        input: &'a mut Input<T>,
        output: &'a Sender<T>,
    ) -> BoxFuture<'a, bool>;
}

/// The stock specialized strategy, usable for any element type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Typed;

impl<T: Send + 'static> Forward<T> for Typed {
    fn advance<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        input: &'a mut Input<T>,
        output: &'a Sender<T>,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match select(cancel, input).await {
                Event::Cancelled | Event::Exhausted => true,
                Event::Item(item) => output.send(item).await.is_err(),
            }
        })
    }
}

/// The output side as seen by the generic fallback.
pub(crate) trait ErasedSink: Send + Sync {
    /// Hand over a boxed element. Returns `false` if it could not be delivered.
    fn send_any(&self, item: Box<dyn Any + Send>) -> BoxFuture<'_, bool>;
}

impl<T: Send + 'static> ErasedSink for Sender<T> {
    fn send_any(&self, item: Box<dyn Any + Send>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match item.downcast::<T>() {
                Ok(item) => self.send(*item).await.is_ok(),
                Err(_) => false,
            }
        })
    }
}

/// The generic fallback strategy, built once per merge from the element type
/// every source was validated to carry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reflective {
    element: ElementType,
}

impl Reflective {
    pub(crate) fn new(element: ElementType) -> Self {
        Self { element }
    }

    /// Same contract as [`Forward::advance`], over an erased input and output.
    pub(crate) async fn advance(
        &self,
        cancel: &CancellationToken,
        input: &mut ErasedInput,
        output: &dyn ErasedSink,
    ) -> bool {
        match select(cancel, input).await {
            Event::Cancelled | Event::Exhausted => true,
            Event::Item(item) => {
                // Deref first: `Box<dyn Any>` is itself `Any`.
                if (*item).type_id() != self.element.id() {
                    error!(
                        expected = self.element.name(),
                        "source yielded an element of an unexpected type"
                    );
                    return true;
                }
                !output.send_any(item).await
            }
        }
    }
}
