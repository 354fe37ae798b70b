//! Type-flexible fan-in.
//!
//! Combine any number of sources that carry the same element type into one
//! stream, without writing a merge routine per element type. Each source gets
//! its own Tokio task forwarding into a zero-capacity rendezvous channel, and
//! the merged stream ends once every source is exhausted or a shared
//! [`CancellationToken`] fires.
//!
//! Sources are passed as opaque [`Handle`]s. Whether a handle really is a
//! readable sequence, and whether all of them agree on the element type, is
//! checked at runtime before anything is spawned.
//!
//! # Strategies
//!
//! By default every element goes through a generic forwarding path that boxes
//! it and checks its type on the way. This works for anything and needs no
//! setup. Latency sensitive pipelines should use a specialized strategy
//! instead, e.g. [`Config::typed`] or one of the per-type shorthands like
//! [`Config::i64s`]. The output is the same either way.
//!
//! # Examples
//!
//! ```
//! use fan_in::{Config, IntoHandle};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), fan_in::Error> {
//! let (tx_a, a) = mpsc::channel(1);
//! let (tx_b, b) = mpsc::channel(1);
//! tokio::spawn(async move {
//!     for n in [1, 3] {
//!         tx_a.send(n).await.unwrap();
//!     }
//! });
//! tokio::spawn(async move {
//!     for n in [2, 4] {
//!         tx_b.send(n).await.unwrap();
//!     }
//! });
//!
//! // Closing `done` would stop the merge before `a` and `b` run dry.
//! let done = CancellationToken::new();
//! let mut merged = Config::i32s().merge(&done, [a, b])?;
//!
//! let mut all = Vec::new();
//! while let Some(n) = merged.recv().await {
//!     all.push(n);
//! }
//! all.sort_unstable();
//! assert_eq!(all, [1, 2, 3, 4]);
//! # Ok(())
//! # }
//! ```
//!
//! Sources are only known to agree at runtime, so a mismatch is an error
//! rather than a compile failure:
//!
//! ```
//! use fan_in::{Error, Handle};
//! use futures_lite::stream;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cancel = CancellationToken::new();
//! let err = fan_in::merge::<u8, _>(
//!     &cancel,
//!     [Handle::stream(stream::once(1u8)), Handle::stream(stream::once("two"))],
//! )
//! .unwrap_err();
//! assert!(matches!(err, Error::TypeMismatch { index: 1, .. }));
//! # }
//! ```

#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

mod config;
mod error;
mod forward;
mod handle;
mod select;
mod utils;
mod validate;
mod worker;

pub mod sink;

pub use config::{merge, Config};
pub use error::{Error, Result};
pub use forward::{Forward, Typed};
pub use handle::{Direction, ElementType, Handle, Input, IntoHandle};
pub use sink::{Receiver, Sender};

pub use tokio_util::sync::CancellationToken;
