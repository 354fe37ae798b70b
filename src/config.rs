use crate::error::{Error, Result};
use crate::forward::{Forward, Reflective, Typed};
use crate::handle::{ElementType, Handle, IntoHandle};
use crate::sink::{self, Receiver};
use crate::validate::{validate, Validated};
use crate::worker;

use core::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How to fan-in sources with elements of type `T`.
///
/// The only thing to configure is the forwarding strategy. Without one, the
/// generic fallback is used: it works for every element type but boxes and
/// type-checks each element on its way through. Providing a [`Forward`]
/// implementation, such as [`Typed`] via [`Config::typed`], avoids that cost.
/// The choice never changes what ends up in the output.
///
/// # Examples
///
/// ```
/// use fan_in::Config;
/// use futures_lite::{stream, StreamExt};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fan_in::Error> {
/// let a = stream::iter(vec![1, 3]);
/// let b = stream::iter(vec![2, 4]);
///
/// let cancel = CancellationToken::new();
/// let merged = Config::<i32>::typed().merge(
///     &cancel,
///     [fan_in::Handle::stream(a), fan_in::Handle::stream(b)],
/// )?;
///
/// let mut all: Vec<i32> = merged.collect().await;
/// all.sort_unstable();
/// assert_eq!(all, [1, 2, 3, 4]);
/// # Ok(())
/// # }
/// ```
pub struct Config<T> {
    forward: Option<Arc<dyn Forward<T>>>,
}

impl<T: Send + 'static> Config<T> {
    /// A configuration using the generic fallback strategy.
    pub fn new() -> Self {
        Self { forward: None }
    }

    /// A configuration using the stock specialized strategy for `T`.
    pub fn typed() -> Self {
        Self::with_forward(Typed)
    }

    /// A configuration using a caller-supplied specialized strategy.
    pub fn with_forward<F: Forward<T>>(forward: F) -> Self {
        Self {
            forward: Some(Arc::new(forward)),
        }
    }

    /// Returns `true` unless this configuration uses the generic fallback.
    pub fn is_specialized(&self) -> bool {
        self.forward.is_some()
    }

    /// Merge `sources` into a single stream.
    ///
    /// One task is spawned per source, each forwarding elements into the
    /// returned [`Receiver`] until its source is exhausted or `cancel` fires.
    /// The receiver yields `None` once every one of those tasks has stopped.
    ///
    /// Elements from the same source keep their relative order; elements
    /// from different sources interleave arbitrarily. After `cancel` fires,
    /// elements that were already on their way may or may not be delivered.
    ///
    /// Nothing is spawned unless every source passes validation.
    ///
    /// # Errors
    ///
    /// Fails if `sources` is empty, if any of them is not a readable sequence,
    /// if their element types differ from the first one's, or if that element
    /// type is not `T`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn merge<I>(&self, cancel: &CancellationToken, sources: I) -> Result<Receiver<T>>
    where
        I: IntoIterator,
        I::Item: IntoHandle,
    {
        let handles: Vec<Handle> = sources.into_iter().map(IntoHandle::into_handle).collect();
        let Validated { element, sources } = validate(handles)?;

        let expected = ElementType::of::<T>();
        if element != expected {
            return Err(Error::OutputMismatch {
                expected,
                found: element,
            });
        }

        debug!(
            %element,
            sources = sources.len(),
            specialized = self.is_specialized(),
            "starting merge"
        );

        let (output, receiver, closer) = sink::channel::<T>();
        let mut workers = JoinSet::new();

        match &self.forward {
            Some(forward) => {
                let mut inputs = Vec::with_capacity(sources.len());
                for source in sources {
                    let index = source.index();
                    let input = source.into_input::<T>().ok_or(Error::OutputMismatch {
                        expected,
                        found: element,
                    })?;
                    inputs.push((index, input));
                }

                for (index, input) in inputs {
                    workers.spawn(worker::run(
                        index,
                        cancel.clone(),
                        input,
                        output.clone(),
                        forward.clone(),
                    ));
                }
            }
            None => {
                let strategy = Reflective::new(element);
                for source in sources {
                    workers.spawn(worker::run_erased(
                        source.index(),
                        cancel.clone(),
                        source.into_erased(),
                        output.clone(),
                        strategy,
                    ));
                }
            }
        }

        drop(output);
        tokio::spawn(worker::coordinate(workers, closer));

        Ok(receiver)
    }
}

impl<T: Send + 'static> Default for Config<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            forward: self.forward.clone(),
        }
    }
}

impl<T> fmt::Debug for Config<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match self.forward {
            Some(_) => "specialized",
            None => "generic",
        };
        f.debug_struct("Config")
            .field("element", &core::any::type_name::<T>())
            .field("strategy", &strategy)
            .finish()
    }
}

/// Merge `sources` using the generic fallback strategy.
///
/// Shorthand for `Config::new().merge(cancel, sources)`. See
/// [`Config::merge`] for the details.
///
/// # Examples
///
/// ```
/// use fan_in::IntoHandle;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fan_in::Error> {
/// let (tx, rx) = mpsc::channel(1);
/// tokio::spawn(async move { tx.send("hello").await });
///
/// let cancel = CancellationToken::new();
/// let mut merged = fan_in::merge::<&str, _>(&cancel, [rx.into_handle()])?;
/// assert_eq!(merged.recv().await, Some("hello"));
/// assert_eq!(merged.recv().await, None);
/// # Ok(())
/// # }
/// ```
pub fn merge<T, I>(cancel: &CancellationToken, sources: I) -> Result<Receiver<T>>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: IntoHandle,
{
    Config::new().merge(cancel, sources)
}

macro_rules! typed_constructors {
    ($($name:ident => $ty:ty,)*) => {$(
        impl Config<$ty> {
            #[doc = concat!("The specialized configuration for `", stringify!($ty), "` elements.")]
            pub fn $name() -> Self {
                Self::typed()
            }
        }
    )*};
}

typed_constructors! {
    bools => bool,
    chars => char,
    strings => String,
    byte_vecs => Vec<u8>,
    i8s => i8,
    i16s => i16,
    i32s => i32,
    i64s => i64,
    i128s => i128,
    isizes => isize,
    u8s => u8,
    u16s => u16,
    u32s => u32,
    u64s => u64,
    u128s => u128,
    usizes => usize,
    f32s => f32,
    f64s => f64,
    anys => Box<dyn core::any::Any + Send>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::{stream, StreamExt};

    #[tokio::test]
    async fn nothing_is_spawned_on_error() {
        let cancel = CancellationToken::new();
        let err = Config::<u8>::typed()
            .merge(&cancel, [Handle::stream(stream::iter(vec![1u16]))])
            .unwrap_err();
        assert_eq!(
            err,
            Error::OutputMismatch {
                expected: ElementType::of::<u8>(),
                found: ElementType::of::<u16>(),
            }
        );

        let err = Config::<u8>::new()
            .merge(&cancel, Vec::<Handle>::new())
            .unwrap_err();
        assert_eq!(err, Error::NoSources);
    }

    #[tokio::test]
    async fn constructors_pick_a_strategy() {
        assert!(!Config::<u8>::new().is_specialized());
        assert!(!Config::<u8>::default().is_specialized());
        assert!(Config::<u8>::typed().is_specialized());
        assert!(Config::strings().is_specialized());
        assert!(Config::anys().clone().is_specialized());
        assert_eq!(
            format!("{:?}", Config::<u8>::new()),
            r#"Config { element: "u8", strategy: "generic" }"#
        );
    }

    #[tokio::test]
    async fn boxed_any_elements() {
        let cancel = CancellationToken::new();
        let source = stream::iter(vec![Box::new(1u8) as Box<dyn core::any::Any + Send>]);
        let merged = Config::anys()
            .merge(&cancel, [Handle::stream(source)])
            .unwrap();

        let items: Vec<_> = merged.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].downcast_ref::<u8>(), Some(&1));
    }
}
