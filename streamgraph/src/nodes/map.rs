use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{GraphError, OperatorError};
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// Applies `func` to every value pushed through it and forwards the result.
/// A panicking `func` is caught and turned into `OperatorError::Panicked`
/// rather than unwinding across the graph.
pub struct MapStream<IN: Element, OUT: Element> {
    id: u64,
    func: Box<dyn Fn(IN) -> OUT>,
    children: Children<OUT>,
}

impl<IN: Element, OUT: Element> MapStream<IN, OUT> {
    pub fn new(func: impl Fn(IN) -> OUT + 'static, upstream: Rc<dyn Stream<IN>>) -> Rc<Self> {
        let id = next_node_id();
        let node = Rc::new(MapStream {
            id,
            func: Box::new(func),
            children: Children::new(id),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<IN: Element, OUT: Element> GraphNode for MapStream<IN, OUT> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<IN: Element, OUT: Element> Sink<IN> for MapStream<IN, OUT> {
    fn emit(self: Rc<Self>, value: IN) -> Token {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(value))) {
            Ok(mapped) => self.children.propagate(mapped),
            Err(payload) => Token::failed(OperatorError::from_panic(
                self.id,
                self.type_name(),
                payload,
            )),
        }
    }
}

impl<IN: Element, OUT: Element> Stream<OUT> for MapStream<IN, OUT> {
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
    use crate::nodes::{sink_to_list, SourceStream};

    #[test]
    fn map_applies_func_to_every_value() {
        let source = SourceStream::<u64>::new();
        let doubled = MapStream::new(|x| x * 2, source.clone());
        let out = sink_to_list(doubled);
        block_on_local(async {
            for i in 0..4u64 {
                source.clone().emit(i).await.unwrap();
            }
        });
        assert_eq!(*out.borrow(), vec![0, 2, 4, 6]);
    }

    #[test]
    fn panicking_map_surfaces_as_operator_error() {
        let source = SourceStream::<u64>::new();
        let mapped = MapStream::new(
            |x: u64| -> u64 {
                if x == 1 {
                    panic!("boom");
                }
                x
            },
            source.clone(),
        );
        let _out = sink_to_list(mapped);
        block_on_local(async {
            source.clone().emit(0).await.unwrap();
            let err = source.clone().emit(1).await.unwrap_err();
            assert!(matches!(err, OperatorError::Panicked { .. }));
        });
    }
}
