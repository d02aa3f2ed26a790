use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{GraphError, OperatorError};
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Forwards a value only when `predicate` returns `true`; values that fail
/// the predicate are dropped and the emit completes immediately.
pub struct FilterStream<T: Element> {
    id: u64,
    predicate: Box<dyn Fn(&T) -> bool>,
    children: Children<T>,
}

impl<T: Element> FilterStream<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + 'static, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        let id = next_node_id();
        let node = Rc::new(FilterStream {
            id,
            predicate: Box::new(predicate),
            children: Children::new(id),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for FilterStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for FilterStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(&value))) {
            Ok(true) => self.children.propagate(value),
            Ok(false) => Token::done(),
            Err(payload) => Token::failed(OperatorError::from_panic(
                self.id,
                self.type_name(),
                payload,
            )),
        }
    }
}

impl<T: Element> Stream<T> for FilterStream<T> {
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
    fn filter_keeps_only_matching_values() {
        let source = SourceStream::<u64>::new();
        let evens = FilterStream::new(|x: &u64| x % 2 == 0, source.clone());
        let out = sink_to_list(evens);
        block_on_local(async {
            for i in 0..10u64 {
                source.clone().emit(i).await.unwrap();
            }
        });
        assert_eq!(*out.borrow(), vec![0, 2, 4, 6, 8]);
    }
}
