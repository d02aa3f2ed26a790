//! The single host runtime this crate assumes: one OS thread, a
//! `tokio::task::LocalSet` driving every timer-owning node
//! (`Counter`, `rate_limit`, `delay`, `timed_window`) and every async sink,
//! alongside synchronous graph traversal for everything else.
//!
//! wingfoil makes this pluggable behind its `async` Cargo feature because a
//! graph can run purely historically with no runtime at all; this crate's
//! event loop is load-bearing for half the operators, so it is always on.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Sleep;

use crate::time::NanoTime;

/// Current monotonic time, as read by time-aware operators.
pub fn now() -> NanoTime {
    NanoTime::now()
}

/// Suspends the calling task for `duration`. A thin wrapper so operator
/// modules depend on `event_loop::sleep` rather than reaching into `tokio`
/// directly.
pub fn sleep(duration: Duration) -> Sleep {
    tokio::time::sleep(duration)
}

/// Spawns a task onto the current `LocalSet`, starting it immediately
/// regardless of whether anything ever polls the returned handle. Used both
/// for background flush/tick loops (`Counter`, `delay`, `timed_window`,
/// `buffer`'s drain task — aborted by the node's `Drop` impl) and, crucially,
/// for any per-`emit` suspension (`rate_limit`, `delay`): a `Token` built
/// directly as an async block is lazy and would never run if the caller
/// dropped it without awaiting, which the spec's "a token may be discarded
/// without awaiting — the emission still runs to completion eventually"
/// guarantee forbids. Spawning first and handing back a `Token` that merely
/// awaits the `JoinHandle` keeps that guarantee regardless of whether the
/// token itself is ever polled.
pub fn spawn_local<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + 'static,
{
    tokio::task::spawn_local(fut)
}

pub type QueueSender<T> = mpsc::Sender<T>;
pub type QueueReceiver<T> = mpsc::Receiver<T>;

/// A bounded channel whose `send`/`recv` suspend rather than error when the
/// queue is full or empty, backing `buffer`'s internal storage.
pub fn bounded_queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    mpsc::channel(capacity)
}

/// Test-only helper: runs `fut` to completion on a fresh current-thread
/// runtime plus `LocalSet`, the only combination that can host this crate's
/// `Rc`-based, `!Send` node state. Colocated operator tests use this in
/// place of `#[tokio::test]`, which defaults to requiring `Send` futures.
#[cfg(test)]
pub(crate) fn block_on_local<F: Future>(fut: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build current-thread test runtime");
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, fut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_on_local_runs_spawned_tasks() {
        block_on_local(async {
            let (done_tx, mut done_rx) = mpsc::channel(1);
            spawn_local(async move {
                sleep(Duration::from_millis(1)).await;
                let _ = done_tx.send(()).await;
            });
            done_rx.recv().await.expect("task did not complete");
        });
    }
}
