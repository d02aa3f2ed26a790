use std::rc::Rc;

use crate::error::GraphError;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Element, Sink, Stream, Token};

/// The manually-pushed entry point into a graph. Calling `.emit(value)` on
/// the `Rc<SourceStream<T>>` returned by `new` starts a push through
/// whatever operators were wired downstream with `emit_to`.
pub struct SourceStream<T: Element> {
    id: u64,
    children: Children<T>,
}

impl<T: Element> SourceStream<T> {
    pub fn new() -> Rc<Self> {
        let id = next_node_id();
        Rc::new(SourceStream {
            id,
            children: Children::new(id),
        })
    }
}

impl<T: Element> GraphNode for SourceStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for SourceStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        self.children.propagate(value)
    }
}

impl<T: Element> Stream<T> for SourceStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<T>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}
