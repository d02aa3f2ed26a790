use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{report_unawaited_error, GraphError, OperatorError};
use crate::event_loop::{self, QueueSender};
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Decouples producer and consumer rate with a bounded internal queue of
/// `capacity` slots. `emit` completes as soon as the value is queued —
/// immediately while the queue has room, suspended until it does once full
/// — and a background task drains the queue one value at a time,
/// propagating each downstream and waiting for its token before pulling the
/// next. Nothing queued is ever dropped.
pub struct BufferStream<T: Element> {
    id: u64,
    sender: QueueSender<T>,
    children: Rc<Children<T>>,
    task: RefCell<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Element> BufferStream<T> {
    pub fn new(capacity: usize, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        let id = next_node_id();
        let (sender, mut receiver) = event_loop::bounded_queue::<T>(capacity);
        let children = Rc::new(Children::new(id));

        let drain_children = children.clone();
        let task = event_loop::spawn_local(async move {
            while let Some(value) = receiver.recv().await {
                if let Err(err) = drain_children.propagate(value).await {
                    report_unawaited_error(&err);
                }
            }
        });

        let node = Rc::new(BufferStream {
            id,
            sender,
            children,
            task: RefCell::new(Some(task)),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for BufferStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for BufferStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        // Fast path: room in the queue, so the value is enqueued
        // synchronously and the token is already resolved — no suspension,
        // matching the spec's "producer is not blocked" case exactly, and
        // the enqueue happens whether or not the caller ever polls the
        // token.
        let type_name = self.type_name();
        let value = match self.sender.try_send(value) {
            Ok(()) => return Token::done(),
            Err(tokio::sync::mpsc::error::TrySendError::Full(value)) => value,
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                return Token::failed(OperatorError::failed(
                    self.id,
                    type_name,
                    anyhow::anyhow!("buffer's drain task has stopped"),
                ));
            }
        };
        // Slow path: queue full. Spawn the suspended send eagerly so it
        // still completes even if the caller drops the returned token.
        let sender = self.sender.clone();
        let id = self.id;
        let spawn_type_name = type_name.clone();
        let handle = event_loop::spawn_local(async move {
            sender.send(value).await.map_err(|_| {
                OperatorError::failed(id, spawn_type_name, anyhow::anyhow!("buffer's drain task has stopped"))
            })
        });
        Token::pending(async move {
            handle.await.unwrap_or_else(|join_err| {
                Err(OperatorError::failed(id, type_name, anyhow::anyhow!(join_err)))
            })
        })
    }
}

impl<T: Element> Stream<T> for BufferStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<T>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}

impl<T: Element> Drop for BufferStream<T> {
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
    use crate::nodes::{sink_to_list, MapStream, SourceStream};
    use std::time::Duration;

    #[test]
    fn buffer_never_drops_queued_values() {
        let source = SourceStream::<u64>::new();
        let incremented = MapStream::new(|x: u64| x + 1, source.clone());
        let buffered = BufferStream::new(10, incremented);
        let out_stream = MapStream::new(|x: u64| x + 1, buffered);
        let out = sink_to_list(out_stream);

        block_on_local(async {
            for i in 0..10u64 {
                source.clone().emit(i).await.unwrap();
            }
            event_loop::sleep(Duration::from_millis(5)).await;
        });
        assert_eq!(out.borrow().len(), 10);
    }

    #[test]
    fn emit_suspends_once_the_queue_is_full() {
        use crate::nodes::StreamOperators;
        use crate::types::SinkOutcome;
        use std::time::Instant;

        let _ = env_logger::try_init();
        let source = SourceStream::<u64>::new();
        let buffered = BufferStream::new(2, source.clone());
        // A slow sink keeps the drain task busy so the queue fills up.
        let _sink = buffered.clone().sink(|_: u64| {
            SinkOutcome::Pending(Token::pending(async move {
                event_loop::sleep(Duration::from_millis(20)).await;
                Ok(())
            }))
        });

        block_on_local(async {
            let start = Instant::now();
            for i in 0..5u64 {
                source.clone().emit(i).await.unwrap();
            }
            // With capacity 2 and a 20ms-per-item sink, filling the queue
            // then draining enough of it to accept all 5 values takes a
            // few multiples of 20ms.
            assert!(start.elapsed() >= Duration::from_millis(40));
        });
    }
}
