use std::rc::Rc;
use std::time::Duration;

use crate::error::{GraphError, OperatorError, TimingError};
use crate::event_loop;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Forwards every pushed value after `interval`. Unlike `rate_limit`,
/// values are never serialized against each other — each `emit` schedules
/// its own independent wait — but the token handed back to the caller
/// still resolves only once that value's delayed propagation has finished
/// downstream, so a caller that awaits it gets the full delay plus
/// downstream latency as its own completion time, exactly as it would for
/// an un-delayed child.
pub struct DelayStream<T: Element> {
    id: u64,
    interval: Duration,
    children: Rc<Children<T>>,
}

impl<T: Element> DelayStream<T> {
    pub fn new(interval: Duration, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        assert!(
            !interval.is_zero(),
            "{}",
            TimingError::NonPositiveInterval(interval)
        );
        let id = next_node_id();
        let node = Rc::new(DelayStream {
            id,
            interval,
            children: Rc::new(Children::new(id)),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for DelayStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for DelayStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        let id = self.id;
        let type_name = self.type_name();
        let interval = self.interval;
        let children = self.children.clone();
        // Spawned eagerly so the delayed propagation runs even if the
        // caller drops the returned token without awaiting it.
        let handle = event_loop::spawn_local(async move {
            event_loop::sleep(interval).await;
            children.propagate(value).await
        });
        Token::pending(async move {
            handle.await.unwrap_or_else(|join_err| {
                Err(OperatorError::failed(id, type_name, anyhow::anyhow!(join_err)))
            })
        })
    }
}

impl<T: Element> Stream<T> for DelayStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<T>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::block_on_local;
    use crate::nodes::{sink_to_list, SourceStream};

    #[test]
    fn delay_does_not_block_the_emitter() {
        let source = SourceStream::<u64>::new();
        let delayed = DelayStream::new(Duration::from_millis(20), source.clone());
        let out = sink_to_list(delayed);

        block_on_local(async {
            // Each delayed propagation is already spawned onto the loop by
            // the time `emit` returns, so dropping the token without
            // awaiting it still lets the value arrive on schedule.
            for i in 0..5u64 {
                let _ = source.clone().emit(i);
            }
            assert!(out.borrow().is_empty());

            event_loop::sleep(Duration::from_millis(60)).await;
            assert_eq!(out.borrow().len(), 5);
        });
    }

    #[test]
    fn delay_token_resolves_only_after_the_delayed_propagation() {
        let source = SourceStream::<u64>::new();
        let delayed = DelayStream::new(Duration::from_millis(20), source.clone());
        let out = sink_to_list(delayed);

        block_on_local(async {
            let start = std::time::Instant::now();
            source.clone().emit(1).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(20));
            assert_eq!(*out.borrow(), vec![1]);
        });
    }
}
