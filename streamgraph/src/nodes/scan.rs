use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{GraphError, OperatorError};
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Folds every pushed value into a running accumulator and forwards the
/// updated accumulator downstream. The accumulator is updated before
/// propagation begins and is never rolled back, even if a downstream sink
/// later fails — `scan` has already committed to the new state by the time
/// it starts fanning out.
pub struct ScanStream<IN: Element, OUT: Element> {
    id: u64,
    func: Box<dyn Fn(&OUT, IN) -> OUT>,
    state: RefCell<OUT>,
    children: Children<OUT>,
}

impl<IN: Element, OUT: Element> ScanStream<IN, OUT> {
    pub fn new(
        func: impl Fn(&OUT, IN) -> OUT + 'static,
        start: OUT,
        upstream: Rc<dyn Stream<IN>>,
    ) -> Rc<Self> {
        let id = next_node_id();
        let node = Rc::new(ScanStream {
            id,
            func: Box::new(func),
            state: RefCell::new(start),
            children: Children::new(id),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<IN: Element, OUT: Element> GraphNode for ScanStream<IN, OUT> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<IN: Element, OUT: Element> Sink<IN> for ScanStream<IN, OUT> {
    fn emit(self: Rc<Self>, value: IN) -> Token {
        let previous = self.state.borrow().clone();
        match catch_unwind(AssertUnwindSafe(|| (self.func)(&previous, value))) {
            Ok(next) => {
                *self.state.borrow_mut() = next.clone();
                self.children.propagate(next)
            }
            Err(payload) => Token::failed(OperatorError::from_panic(
                self.id,
                self.type_name(),
                payload,
            )),
        }
    }
}

impl<IN: Element, OUT: Element> Stream<OUT> for ScanStream<IN, OUT> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<OUT>>) -> Result<(), GraphError> {
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
    use crate::nodes::{sink_to_list, MapStream, SourceStream};

    #[test]
    fn scan_running_sum_with_two_sibling_maps() {
        let source = SourceStream::<u64>::new();
        let incremented = MapStream::new(|x: u64| x + 1, source.clone());
        let doubled = MapStream::new(|x: u64| x * 2, source.clone());

        let running_sum = ScanStream::new(|acc: &u64, x: u64| acc + x, 0, incremented);

        let sums = sink_to_list(running_sum);
        let doubles = sink_to_list(doubled);

        block_on_local(async {
            for i in 0..4u64 {
                source.clone().emit(i).await.unwrap();
            }
        });

        assert_eq!(*sums.borrow(), vec![1, 3, 6, 10]);
        assert_eq!(*doubles.borrow(), vec![0, 2, 4, 6]);
    }
}
