use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{report_unawaited_error, GraphError, TimingError};
use crate::event_loop;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Buffers pushed values and flushes them, as a `Vec<T>`, once every
/// `interval`, emitting an empty batch if nothing arrived. Pushing into the
/// buffer itself never suspends `emit`; only the completion token does,
/// and only while backpressured — see [`TimedWindowStream::emit`]. The
/// flush loop re-arms its `interval` sleep only after the previous flush's
/// token has resolved, so two flushes never run concurrently.
pub struct TimedWindowStream<T: Element> {
    id: u64,
    pub interval: Duration,
    buffer: Rc<RefCell<Vec<T>>>,
    flushing: Rc<Cell<bool>>,
    flush_count: watch::Sender<u64>,
    children: Rc<Children<Vec<T>>>,
    task: RefCell<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Element> TimedWindowStream<T> {
    pub fn new(interval: Duration, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        assert!(
            !interval.is_zero(),
            "{}",
            TimingError::NonPositiveInterval(interval)
        );
        let id = next_node_id();
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let flushing = Rc::new(Cell::new(false));
        let (flush_count, _) = watch::channel(0u64);
        let children = Rc::new(Children::new(id));

        let flush_buffer = buffer.clone();
        let flush_flushing = flushing.clone();
        let flush_children = children.clone();
        let flush_count_tx = flush_count.clone();
        let task = event_loop::spawn_local(async move {
            loop {
                event_loop::sleep(interval).await;
                let batch = std::mem::take(&mut *flush_buffer.borrow_mut());
                flush_flushing.set(true);
                let result = flush_children.propagate(batch).await;
                flush_flushing.set(false);
                flush_count_tx.send_modify(|count| *count += 1);
                if let Err(err) = result {
                    report_unawaited_error(&err);
                }
            }
        });

        let node = Rc::new(TimedWindowStream {
            id,
            interval,
            buffer,
            flushing,
            flush_count,
            children,
            task: RefCell::new(Some(task)),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for TimedWindowStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for TimedWindowStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        self.buffer.borrow_mut().push(value);
        if !self.flushing.get() {
            return Token::done();
        }
        // Backpressured: the previous batch hasn't finished propagating
        // downstream yet. Suspend until it does, via a watch channel that
        // (unlike a bare `Notify`) keeps its last value, so there is no
        // lost-wakeup window between reading `flushing` here and the flush
        // task's `send_modify` landing first.
        let mut rx = self.flush_count.subscribe();
        let seen = *rx.borrow();
        Token::pending(async move {
            while *rx.borrow() <= seen {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}

impl<T: Element> Stream<Vec<T>> for TimedWindowStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<Vec<T>>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}

impl<T: Element> Drop for TimedWindowStream<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::block_on_local;
    use crate::nodes::{sink_to_list, SourceStream};

    #[test]
    fn timed_window_flushes_on_interval_including_empty_batches() {
        let source = SourceStream::<u64>::new();
        let windowed = TimedWindowStream::new(Duration::from_millis(10), source.clone());
        let out = sink_to_list(windowed);

        block_on_local(async {
            for i in 0..10u64 {
                source.clone().emit(i).await.unwrap();
                event_loop::sleep(Duration::from_millis(4)).await;
            }
            event_loop::sleep(Duration::from_millis(15)).await;
        });

        let flushed = out.borrow();
        let all_values: Vec<u64> = flushed.iter().flatten().copied().collect();
        assert_eq!(all_values, (0..10).collect::<Vec<u64>>());
        assert!(flushed.last().is_some_and(|batch| batch.is_empty()));
    }

    #[test]
    fn emit_suspends_while_the_previous_flush_is_still_propagating() {
        use crate::nodes::StreamOperators;
        use crate::types::SinkOutcome;
        use std::time::Instant;

        let _ = env_logger::try_init();
        let source = SourceStream::<u64>::new();
        let windowed = TimedWindowStream::new(Duration::from_millis(10), source.clone());
        // A slow downstream sink keeps the flush's token pending long
        // enough for a subsequent `emit` to observe `flushing == true`.
        let _sink = windowed.clone().sink(|_batch: Vec<u64>| {
            SinkOutcome::Pending(Token::pending(async move {
                event_loop::sleep(Duration::from_millis(30)).await;
                Ok(())
            }))
        });

        block_on_local(async {
            source.clone().emit(0).await.unwrap();
            // Let the timer fire and the slow flush start.
            event_loop::sleep(Duration::from_millis(15)).await;

            let start = Instant::now();
            source.clone().emit(1).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(10));
        });
    }
}
