use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::GraphError;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Forwards, for every new value once `size` values have been seen, the
/// last `size` values (including the new one) as a `Vec<T>`. Unlike
/// `partition`, windows overlap: each new value slides the window forward
/// by one rather than starting a fresh batch.
pub struct SlidingWindowStream<T: Element> {
    id: u64,
    size: usize,
    buffer: RefCell<VecDeque<T>>,
    children: Children<Vec<T>>,
}

impl<T: Element> SlidingWindowStream<T> {
    /// Panics if `size` is zero.
    pub fn new(size: usize, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        assert!(size > 0, "sliding_window size must be non-zero");
        let id = next_node_id();
        let node = Rc::new(SlidingWindowStream {
            id,
            size,
            buffer: RefCell::new(VecDeque::with_capacity(size)),
            children: Children::new(id),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for SlidingWindowStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for SlidingWindowStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        let window = {
            let mut buffer = self.buffer.borrow_mut();
            buffer.push_back(value);
            if buffer.len() > self.size {
                buffer.pop_front();
            }
            if buffer.len() < self.size {
                None
            } else {
                Some(buffer.iter().cloned().collect::<Vec<T>>())
            }
        };
        match window {
            Some(window) => self.children.propagate(window),
            None => Token::done(),
        }
    }
}

impl<T: Element> Stream<Vec<T>> for SlidingWindowStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<Vec<T>>>) -> Result<(), GraphError> {
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
    fn sliding_window_overlaps_by_one() {
        let source = SourceStream::<u64>::new();
        let windows = SlidingWindowStream::new(2, source.clone());
        let out = sink_to_list(windows);
        block_on_local(async {
            for i in 0..10u64 {
                source.clone().emit(i).await.unwrap();
            }
        });
        let expected: Vec<Vec<u64>> = (0..9).map(|i| vec![i, i + 1]).collect();
        assert_eq!(*out.borrow(), expected);
    }
}
