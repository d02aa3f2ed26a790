use std::cell::RefCell;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;

use scopeguard::ScopeGuard;

use crate::error::OperatorError;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Element, Sink, SinkOutcome, Stream, Token};

/// A terminal node: calls `func` with every pushed value and has no
/// children of its own. `func` may finish synchronously or hand back its
/// own [`Token`] (e.g. an async I/O write), which becomes this sink's
/// completion.
pub struct SinkStream<T: Element> {
    id: u64,
    func: Box<dyn Fn(T) -> SinkOutcome>,
}

impl<T: Element> SinkStream<T> {
    pub fn new(upstream: Rc<dyn Stream<T>>, func: impl Fn(T) -> SinkOutcome + 'static) -> Rc<Self> {
        let id = next_node_id();
        let node = Rc::new(SinkStream {
            id,
            func: Box::new(func),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for SinkStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        vec![]
    }
}

impl<T: Element> Sink<T> for SinkStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(value))) {
            Ok(outcome) => outcome.into(),
            Err(payload) => {
                Token::failed(OperatorError::from_panic(self.id, self.type_name(), payload))
            }
        }
    }
}

/// Collects every value into a shared `Vec`, returning the handle the
/// caller inspects; the literal analogue of `streamz`'s `sink_to_list`.
pub fn sink_to_list<T: Element>(upstream: Rc<dyn Stream<T>>) -> Rc<RefCell<Vec<T>>> {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink_collected = collected.clone();
    SinkStream::new(upstream, move |value| {
        sink_collected.borrow_mut().push(value);
        SinkOutcome::Done
    });
    collected
}

fn flush_on_drop(mut file: File) {
    let _ = file.flush();
}

/// A scoped file sink: one line per value, written via `Display`. Attaches
/// on construction; on `Drop` it detaches itself from `upstream`'s children
/// (so a dead `FileSink` can't still be pushed to) and the wrapped
/// [`scopeguard::ScopeGuard`] runs `flush_on_drop`, modeling `streamz`'s
/// `with sink_to_file(fn, source) as f:` context manager the way Rust
/// expresses scoped resources — a guard rather than a `with`-block, the
/// same idiom wingfoil's own `scopeguard` dependency is for.
pub struct FileSink<T: Element> {
    id: u64,
    upstream: Rc<dyn Stream<T>>,
    file: RefCell<Option<ScopeGuard<File, fn(File)>>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Element + Display> FileSink<T> {
    pub fn new(path: impl AsRef<Path>, upstream: Rc<dyn Stream<T>>) -> io::Result<Rc<Self>> {
        let file = File::create(path)?;
        let id = next_node_id();
        let sink = Rc::new(FileSink {
            id,
            upstream: upstream.clone(),
            file: RefCell::new(Some(scopeguard::guard(file, flush_on_drop))),
            _marker: std::marker::PhantomData,
        });
        upstream
            .emit_to(sink.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        Ok(sink)
    }
}

impl<T: Element> GraphNode for FileSink<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        vec![]
    }
}

impl<T: Element + Display> Sink<T> for FileSink<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        let mut slot = self.file.borrow_mut();
        let Some(guard) = slot.as_mut() else {
            return Token::done();
        };
        match writeln!(**guard, "{value}") {
            Ok(()) => Token::done(),
            Err(err) => Token::failed(OperatorError::failed(self.id, self.type_name(), err)),
        }
    }
}

impl<T: Element> Drop for FileSink<T> {
    fn drop(&mut self) {
        // Detach first so `upstream` stops forwarding to a sink that's
        // about to close its file, then run `flush_on_drop` deterministically
        // (rather than waiting for the `RefCell` itself to drop) as part of
        // this node's own teardown, matching the scope-exit semantics
        // `sink_to_file` is modeling.
        self.upstream.detach(self.id);
        self.file.borrow_mut().take();
    }
}
