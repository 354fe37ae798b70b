//! Opaque source handles and the capability facts attached to them.
//!
//! A [`Handle`] is what callers pass into [`merge`](crate::merge). It may wrap
//! a readable sequence, a write-only sink, a sequence bundled with its own
//! writer, or something that isn't a sequence at all. Which one it is, and the
//! element type it carries, is only checked once the whole list reaches the
//! validator.

use core::any::{type_name, Any, TypeId};
use core::fmt;
use core::hash::{Hash, Hasher};

use futures_core::stream::{BoxStream, Stream};
use tokio::sync::mpsc;

/// A boxed, typed input sequence as seen by a forwarding strategy.
pub type Input<T> = BoxStream<'static, T>;

/// An input sequence whose element type has been erased.
pub(crate) type ErasedInput = BoxStream<'static, Box<dyn Any + Send>>;

/// Runtime identity of an element type.
///
/// Two element types compare equal if and only if they were created from the
/// same Rust type.
#[derive(Clone, Copy)]
pub struct ElementType {
    id: TypeId,
    name: &'static str,
}

impl ElementType {
    /// The element type token for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns `true` if this token was created from `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Human readable name of the type. Only meant for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ElementType {}

impl Hash for ElementType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementType").field(&self.name).finish()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Which ends of a sequence a handle gives access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Elements can only be received.
    Recv,
    /// Elements can only be sent.
    Send,
    /// Both ends are available.
    Both,
}

impl Direction {
    /// Returns `true` if elements can be read through this direction.
    pub fn can_recv(self) -> bool {
        matches!(self, Direction::Recv | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Recv => f.write_str("recv"),
            Direction::Send => f.write_str("send"),
            Direction::Both => f.write_str("both"),
        }
    }
}

/// The read half of a typed sequence, before anyone decided how it will be
/// forwarded.
pub(crate) trait Reader: Send {
    /// Recover the typed input. Callers downcast to `TypedReader<T>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    /// Box every element so the input can be driven without knowing its type.
    fn into_erased(self: Box<Self>) -> ErasedInput;
}

pub(crate) struct TypedReader<T>(pub(crate) Input<T>);

impl<T: Send + 'static> Reader for TypedReader<T> {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn into_erased(self: Box<Self>) -> ErasedInput {
        use futures_lite::StreamExt;
        Box::pin(self.0.map(|item| Box::new(item) as Box<dyn Any + Send>))
    }
}

enum Kind {
    Sequence {
        element: ElementType,
        direction: Direction,
        reader: Option<Box<dyn Reader>>,
        // Held so the write half outlives the handle; never written to.
        _writer: Option<Box<dyn Any + Send>>,
    },
    Opaque {
        type_name: &'static str,
    },
}

/// An opaque source handle tagged with its element type and direction.
///
/// Handles are usually created through [`IntoHandle`], which is implemented
/// for the channel types commonly used as sources. Any other stream can be
/// wrapped with [`Handle::stream`].
pub struct Handle {
    kind: Kind,
}

impl Handle {
    /// Wrap a receive-only sequence.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        Self {
            kind: Kind::Sequence {
                element: ElementType::of::<S::Item>(),
                direction: Direction::Recv,
                reader: Some(Box::new(TypedReader::<S::Item>(Box::pin(stream)))),
                _writer: None,
            },
        }
    }

    /// Wrap a sequence together with its write half.
    ///
    /// Only `reader` is ever consumed; `writer` is released once the handle
    /// has been validated. Keep another clone of the writer if the sequence
    /// still has to be fed.
    pub fn duplex<W, S>(writer: W, reader: S) -> Self
    where
        W: Send + 'static,
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        Self {
            kind: Kind::Sequence {
                element: ElementType::of::<S::Item>(),
                direction: Direction::Both,
                reader: Some(Box::new(TypedReader::<S::Item>(Box::pin(reader)))),
                _writer: Some(Box::new(writer)),
            },
        }
    }

    /// Wrap the write half of a sequence of `T`.
    ///
    /// Such a handle can never be a merge source. It exists so mistakes at the
    /// call site surface as a validation error instead of a compile error in
    /// code that assembles handles dynamically.
    pub fn sender<T, W>(writer: W) -> Self
    where
        T: 'static,
        W: Send + 'static,
    {
        Self {
            kind: Kind::Sequence {
                element: ElementType::of::<T>(),
                direction: Direction::Send,
                reader: None,
                _writer: Some(Box::new(writer)),
            },
        }
    }

    /// Wrap a value which is not a sequence.
    pub fn opaque<V>(_value: V) -> Self {
        Self {
            kind: Kind::Opaque {
                type_name: type_name::<V>(),
            },
        }
    }

    /// The element type, if this handle is a sequence.
    pub fn element_type(&self) -> Option<ElementType> {
        match &self.kind {
            Kind::Sequence { element, .. } => Some(*element),
            Kind::Opaque { .. } => None,
        }
    }

    /// The direction, if this handle is a sequence.
    pub fn direction(&self) -> Option<Direction> {
        match &self.kind {
            Kind::Sequence { direction, .. } => Some(*direction),
            Kind::Opaque { .. } => None,
        }
    }

    /// Name of the wrapped type when this handle is not a sequence.
    pub(crate) fn opaque_name(&self) -> Option<&'static str> {
        match &self.kind {
            Kind::Opaque { type_name } => Some(*type_name),
            Kind::Sequence { .. } => None,
        }
    }

    /// Split off the read half. Any bundled writer is dropped here.
    pub(crate) fn into_reader(self) -> Option<Box<dyn Reader>> {
        match self.kind {
            Kind::Sequence { reader, .. } => reader,
            Kind::Opaque { .. } => None,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Sequence {
                element, direction, ..
            } => f
                .debug_struct("Handle")
                .field("element", element)
                .field("direction", direction)
                .finish(),
            Kind::Opaque { type_name } => f
                .debug_struct("Handle")
                .field("opaque", type_name)
                .finish(),
        }
    }
}

/// Conversion into a [`Handle`].
pub trait IntoHandle {
    /// Perform the conversion.
    fn into_handle(self) -> Handle;
}

impl IntoHandle for Handle {
    fn into_handle(self) -> Handle {
        self
    }
}

impl<T: Send + 'static> IntoHandle for mpsc::Receiver<T> {
    fn into_handle(mut self) -> Handle {
        Handle::stream(futures_lite::stream::poll_fn(move |cx| self.poll_recv(cx)))
    }
}

impl<T: Send + 'static> IntoHandle for mpsc::UnboundedReceiver<T> {
    fn into_handle(mut self) -> Handle {
        Handle::stream(futures_lite::stream::poll_fn(move |cx| self.poll_recv(cx)))
    }
}

impl<T: Send + 'static> IntoHandle for mpsc::Sender<T> {
    fn into_handle(self) -> Handle {
        Handle::sender::<T, _>(self)
    }
}

impl<T: Send + 'static> IntoHandle for mpsc::UnboundedSender<T> {
    fn into_handle(self) -> Handle {
        Handle::sender::<T, _>(self)
    }
}

impl<T: Send + 'static> IntoHandle for (mpsc::Sender<T>, mpsc::Receiver<T>) {
    fn into_handle(self) -> Handle {
        let (tx, mut rx) = self;
        Handle::duplex(
            tx,
            futures_lite::stream::poll_fn(move |cx| rx.poll_recv(cx)),
        )
    }
}

impl<T: Send + 'static> IntoHandle for crate::sink::Receiver<T> {
    fn into_handle(self) -> Handle {
        Handle::stream(self)
    }
}
