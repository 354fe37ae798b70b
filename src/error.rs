use crate::handle::{Direction, ElementType};

/// Convenience alias for results returned by this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A configuration error detected while setting up a merge.
///
/// All of these are raised before any worker is spawned, so a failed call to
/// [`merge`](crate::merge) leaves nothing running behind it. They indicate a
/// misuse at the call site rather than a transient condition and are never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `merge` was called without any handles.
    #[error("merge called with no sources provided")]
    NoSources,

    /// The handle at `index` is a plain value, not a sequence.
    #[error("sources[{index}] is not a sequence, is {found}")]
    NotASequence {
        /// Position of the offending handle.
        index: usize,
        /// Type name of the value that was passed.
        found: &'static str,
    },

    /// The handle at `index` can only be written to.
    #[error("sources[{index}] does not support receive, has direction {direction}")]
    WriteOnly {
        /// Position of the offending handle.
        index: usize,
        /// The handle's direction.
        direction: Direction,
    },

    /// The handle at `index` carries a different element type than the first source.
    #[error(
        "sources[{index}] has element type {found}, which does not match previous element type {expected}"
    )]
    TypeMismatch {
        /// Position of the offending handle.
        index: usize,
        /// Element type of the offending handle.
        found: ElementType,
        /// Element type established by the first source.
        expected: ElementType,
    },

    /// The sources agree with each other but not with the requested output type.
    #[error("sources have element type {found}, but the output was requested as {expected}")]
    OutputMismatch {
        /// The output element type asked for by the caller.
        expected: ElementType,
        /// The element type shared by all sources.
        found: ElementType,
    },
}
