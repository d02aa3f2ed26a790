use std::cell::RefCell;
use std::rc::Rc;

use crate::error::GraphError;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Groups pushed values into non-overlapping batches of exactly `size` and
/// forwards each completed batch as a `Vec<T>`; a batch never starts
/// forwarding partially.
pub struct PartitionStream<T: Element> {
    id: u64,
    size: usize,
    buffer: RefCell<Vec<T>>,
    children: Children<Vec<T>>,
}

impl<T: Element> PartitionStream<T> {
    /// Panics if `size` is zero, same as `slice::chunks`.
    pub fn new(size: usize, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        assert!(size > 0, "partition size must be non-zero");
        let id = next_node_id();
        let node = Rc::new(PartitionStream {
            id,
            size,
            buffer: RefCell::new(Vec::with_capacity(size)),
            children: Children::new(id),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for PartitionStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for PartitionStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        let batch = {
            let mut buffer = self.buffer.borrow_mut();
            buffer.push(value);
            if buffer.len() < self.size {
                None
            } else {
                Some(std::mem::replace(&mut *buffer, Vec::with_capacity(self.size)))
            }
        };
        match batch {
            Some(batch) => self.children.propagate(batch),
            None => Token::done(),
        }
    }
}

impl<T: Element> Stream<Vec<T>> for PartitionStream<T> {
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
    fn partition_emits_non_overlapping_chunks() {
        let source = SourceStream::<u64>::new();
        let chunks = PartitionStream::new(2, source.clone());
        let out = sink_to_list(chunks);
        block_on_local(async {
            for i in 0..10u64 {
                source.clone().emit(i).await.unwrap();
            }
        });
        assert_eq!(
            *out.borrow(),
            vec![
                vec![0, 1],
                vec![2, 3],
                vec![4, 5],
                vec![6, 7],
                vec![8, 9],
            ]
        );
    }

    #[test]
    fn partial_batch_never_forwards() {
        let source = SourceStream::<u64>::new();
        let chunks = PartitionStream::new(3, source.clone());
        let out = sink_to_list(chunks);
        block_on_local(async {
            source.clone().emit(0).await.unwrap();
            source.clone().emit(1).await.unwrap();
        });
        assert!(out.borrow().is_empty());
    }
}
