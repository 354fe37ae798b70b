use crate::error::{Error, Result};
use crate::handle::{ElementType, ErasedInput, Handle, Input, Reader, TypedReader};

use core::fmt;

/// A source which passed validation.
pub(crate) struct Source {
    index: usize,
    reader: Box<dyn Reader>,
}

impl Source {
    /// Position of the source in the argument list.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Recover the typed input. Returns `None` if `T` is not the source's
    /// element type.
    pub(crate) fn into_input<T: Send + 'static>(self) -> Option<Input<T>> {
        self.reader
            .into_any()
            .downcast::<TypedReader<T>>()
            .ok()
            .map(|typed| typed.0)
    }

    pub(crate) fn into_erased(self) -> ErasedInput {
        self.reader.into_erased()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").field("index", &self.index).finish()
    }
}

/// The outcome of a successful validation.
#[derive(Debug)]
pub(crate) struct Validated {
    pub(crate) element: ElementType,
    pub(crate) sources: Vec<Source>,
}

/// Check that `handles` is a non-empty list of readable sequences which all
/// share the element type of the first one.
///
/// Fails on the first offending index.
pub(crate) fn validate(handles: Vec<Handle>) -> Result<Validated> {
    let mut element: Option<ElementType> = None;
    let mut sources = Vec::with_capacity(handles.len());

    for (index, handle) in handles.into_iter().enumerate() {
        let (Some(found), Some(direction)) = (handle.element_type(), handle.direction()) else {
            return Err(Error::NotASequence {
                index,
                found: handle.opaque_name().unwrap_or("unknown"),
            });
        };

        if !direction.can_recv() {
            return Err(Error::WriteOnly { index, direction });
        }

        match element {
            None => element = Some(found),
            Some(expected) if expected != found => {
                return Err(Error::TypeMismatch {
                    index,
                    found,
                    expected,
                });
            }
            Some(_) => {}
        }

        let Some(reader) = handle.into_reader() else {
            return Err(Error::WriteOnly { index, direction });
        };
        sources.push(Source { index, reader });
    }

    match element {
        Some(element) => Ok(Validated { element, sources }),
        None => Err(Error::NoSources),
    }
}
