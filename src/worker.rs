//! Per-source workers and the task that closes the output once they're done.

use crate::forward::{Forward, Reflective};
use crate::handle::{ErasedInput, Input};
use crate::sink::{Closer, Sender};

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// The source ran out of elements.
    Exhausted,
    /// The shared cancellation token fired.
    Cancelled,
    /// Nobody is reading the output anymore.
    Disconnected,
}

impl StopReason {
    fn observe<T>(cancel: &CancellationToken, output: &Sender<T>) -> Self {
        if cancel.is_cancelled() {
            StopReason::Cancelled
        } else if output.is_disconnected() {
            StopReason::Disconnected
        } else {
            StopReason::Exhausted
        }
    }
}

/// Drive one source with a specialized strategy until it says stop.
pub(crate) async fn run<T: Send + 'static>(
    index: usize,
    cancel: CancellationToken,
    mut input: Input<T>,
    output: Sender<T>,
    forward: Arc<dyn Forward<T>>,
) -> StopReason {
    while !forward.advance(&cancel, &mut input, &output).await {}

    let reason = StopReason::observe(&cancel, &output);
    trace!(index, ?reason, "merge worker stopped");
    reason
}

/// Drive one type-erased source with the generic fallback.
pub(crate) async fn run_erased<T: Send + 'static>(
    index: usize,
    cancel: CancellationToken,
    mut input: ErasedInput,
    output: Sender<T>,
    strategy: Reflective,
) -> StopReason {
    while !strategy.advance(&cancel, &mut input, &output).await {}

    let reason = StopReason::observe(&cancel, &output);
    trace!(index, ?reason, "merge worker stopped");
    reason
}

#[derive(Debug, Default)]
struct Summary {
    exhausted: usize,
    cancelled: usize,
    disconnected: usize,
    panicked: usize,
    aborted: usize,
}

/// Wait for every worker in `workers` to stop, then close the output.
///
/// This is the only place the output is closed. `workers` must hold every
/// worker of the merge before this is called.
pub(crate) async fn coordinate<T>(mut workers: JoinSet<StopReason>, closer: Closer<T>) {
    let mut summary = Summary::default();

    while let Some(result) = workers.join_next().await {
        match result {
            Ok(StopReason::Exhausted) => summary.exhausted += 1,
            Ok(StopReason::Cancelled) => summary.cancelled += 1,
            Ok(StopReason::Disconnected) => summary.disconnected += 1,
            Err(err) if err.is_panic() => {
                error!(error = %err, "merge worker panicked");
                summary.panicked += 1;
            }
            Err(err) => {
                debug!(error = %err, "merge worker was aborted");
                summary.aborted += 1;
            }
        }
    }

    debug!(
        exhausted = summary.exhausted,
        cancelled = summary.cancelled,
        disconnected = summary.disconnected,
        panicked = summary.panicked,
        aborted = summary.aborted,
        "all merge workers stopped, closing output"
    );
    closer.close();
}
