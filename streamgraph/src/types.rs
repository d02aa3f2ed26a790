use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::{GraphError, OperatorError};
use crate::graph::{try_register_edge, GraphNode, ReentrancyGuard};

/// Anything that can flow through the graph. Wingfoil's `Element` also
/// requires `Debug + Default` because its nodes are peeked and need a
/// placeholder before the first cycle; nodes here are never peeked outside
/// of an `emit`, so only `Clone + 'static` is required (see DESIGN.md).
pub trait Element: Clone + 'static {}
impl<T: Clone + 'static> Element for T {}

/// The completion of an `emit`: either already satisfied, or a boxed future
/// that resolves once every downstream sink that received the value has
/// acknowledged it (or the first one of them failed).
///
/// `Token` is deliberately `!Send` — all graph state is `Rc`/`RefCell` and
/// lives on the single thread that drives the event loop, so there is never
/// a reason to send a `Token` across threads.
pub struct Token(TokenState);

enum TokenState {
    Done,
    Pending(Pin<Box<dyn Future<Output = Result<(), OperatorError>>>>),
}

impl Token {
    pub fn done() -> Self {
        Token(TokenState::Done)
    }

    pub fn pending(fut: impl Future<Output = Result<(), OperatorError>> + 'static) -> Self {
        Token(TokenState::Pending(Box::pin(fut)))
    }

    pub fn failed(err: OperatorError) -> Self {
        Token::pending(async move { Err(err) })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.0, TokenState::Done)
    }
}

impl Future for Token {
    type Output = Result<(), OperatorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().0 {
            TokenState::Done => Poll::Ready(Ok(())),
            TokenState::Pending(fut) => fut.as_mut().poll(cx),
        }
    }
}

/// What a terminal sink callback hands back: either it finished
/// synchronously, or it returned a `Token` of its own (e.g. an async I/O
/// sink) that the caller should fold into the graph's completion chain.
pub enum SinkOutcome {
    Done,
    Pending(Token),
}

impl From<SinkOutcome> for Token {
    fn from(outcome: SinkOutcome) -> Self {
        match outcome {
            SinkOutcome::Done => Token::done(),
            SinkOutcome::Pending(token) => token,
        }
    }
}

/// A node that accepts pushed values. Every stream operator and every
/// terminal sink implements this for whatever element type it consumes.
pub trait Sink<T: Element>: GraphNode {
    fn emit(self: Rc<Self>, value: T) -> Token;
}

/// A node that both accepts values (it is itself a `Sink`) and can have
/// further sinks wired to its output.
pub trait Stream<T: Element>: Sink<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<T>>) -> Result<(), GraphError>;

    /// Detaches a previously wired child by node id. A no-op if `child_id`
    /// isn't currently wired (detaching twice, e.g. from a `Drop` impl that
    /// also ran `emit_to` for itself only once, is not an error). Every
    /// implementor delegates to its own `Children::remove`.
    fn detach(&self, child_id: u64);
}

/// The fan-out list a `Stream<T>` implementation owns. Handles cycle
/// rejection on `add` and the join-all-children semantics on `propagate`:
/// waits for every child's token (so an already-running sibling is never
/// cancelled because another one failed) and reports the first error seen,
/// in child order, exactly as the graph's completion contract requires.
///
/// Also owns the node's [`ReentrancyGuard`]: `propagate` holds it for the
/// duration of the synchronous fan-out (reading `entries` and calling every
/// child's `emit`), and `add` checks it first, so a child being attached via
/// `emit_to` from inside a user callback invoked synchronously during that
/// same fan-out (e.g. a sink closure that turns around and calls back into
/// its own upstream) is rejected with `GraphError::ConcurrentMutation`
/// rather than racing the in-flight loop over `entries`.
pub struct Children<T: Element> {
    node_id: u64,
    entries: RefCell<Vec<Rc<dyn Sink<T>>>>,
    guard: ReentrancyGuard,
}

impl<T: Element> Children<T> {
    pub fn new(node_id: u64) -> Self {
        Children {
            node_id,
            entries: RefCell::new(Vec::new()),
            guard: ReentrancyGuard::default(),
        }
    }

    pub fn add(&self, child: Rc<dyn Sink<T>>) -> Result<(), GraphError> {
        self.guard.check(self.node_id)?;
        try_register_edge(self.node_id, child.node_id())?;
        self.entries.borrow_mut().push(child);
        Ok(())
    }

    pub fn ids(&self) -> Vec<u64> {
        self.entries.borrow().iter().map(|c| c.node_id()).collect()
    }

    /// Removes a previously added child by node id, if present. Used by
    /// sinks that detach themselves from their upstream on `Drop` (e.g.
    /// [`crate::nodes::FileSink`]) rather than outliving the resource they
    /// were flushing into.
    pub fn remove(&self, child_id: u64) {
        self.entries
            .borrow_mut()
            .retain(|child| child.node_id() != child_id);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Pushes `value` to every child and returns a token completing once
    /// all of them have acknowledged it. The single-child case (by far the
    /// common one in a linear pipeline) skips the join machinery entirely
    /// and returns the child's own token directly.
    pub fn propagate(&self, value: T) -> Token {
        let ticket = match self.guard.enter(self.node_id) {
            Ok(ticket) => ticket,
            Err(err) => {
                return Token::failed(OperatorError::failed(
                    self.node_id,
                    "Children",
                    err,
                ))
            }
        };
        let children = self.entries.borrow().clone();
        let token = match children.len() {
            0 => Token::done(),
            1 => {
                let only = children.into_iter().next().expect("length checked above");
                only.emit(value)
            }
            _ => {
                let tokens: Vec<Token> = children
                    .into_iter()
                    .map(|child| child.emit(value.clone()))
                    .collect();
                // Every child was already pushed to above regardless; if
                // each of their tokens is already resolved (the common case
                // for a chain with no suspending operator in it), collapse
                // to `Token::done()` instead of wrapping in a future that
                // would need polling to observe as complete.
                if tokens.iter().all(Token::is_done) {
                    return Token::done();
                }
                Token::pending(async move {
                    // Polled concurrently (not one at a time) so a sibling
                    // that suspends (a `delay`, a slow `Sink`) doesn't stall
                    // the others — each was already pushed to in child
                    // order above, only the *waiting* fans out.
                    let results = futures::future::join_all(tokens).await;
                    results.into_iter().find_map(Result::err).map_or(Ok(()), Err)
                })
            }
        };
        // The guard is only held for the synchronous fan-out above, not for
        // however long `token` itself takes to resolve — a suspended child
        // token is a normal, expected part of propagation, not a
        // re-entrant mutation of this node's own children list.
        drop(ticket);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::next_node_id;

    struct Recorder {
        id: u64,
        seen: RefCell<Vec<u64>>,
    }

    impl GraphNode for Recorder {
        fn node_id(&self) -> u64 {
            self.id
        }
        fn child_ids(&self) -> Vec<u64> {
            vec![]
        }
    }

    impl Sink<u64> for Recorder {
        fn emit(self: Rc<Self>, value: u64) -> Token {
            self.seen.borrow_mut().push(value);
            Token::done()
        }
    }

    #[test]
    fn propagate_to_no_children_is_done() {
        let children: Children<u64> = Children::new(next_node_id());
        let token = children.propagate(42);
        assert!(token.is_done());
    }

    #[test]
    fn propagate_fans_out_to_every_child() {
        let children: Children<u64> = Children::new(next_node_id());
        let a = Rc::new(Recorder {
            id: next_node_id(),
            seen: RefCell::new(vec![]),
        });
        let b = Rc::new(Recorder {
            id: next_node_id(),
            seen: RefCell::new(vec![]),
        });
        children.add(a.clone()).unwrap();
        children.add(b.clone()).unwrap();
        let token = children.propagate(7);
        assert!(token.is_done());
        assert_eq!(*a.seen.borrow(), vec![7]);
        assert_eq!(*b.seen.borrow(), vec![7]);
    }

    #[test]
    fn adding_a_cycle_is_rejected() {
        let parent_id = next_node_id();
        let children: Children<u64> = Children::new(parent_id);
        let child = Rc::new(Recorder {
            id: parent_id,
            seen: RefCell::new(vec![]),
        });
        assert!(children.add(child).is_err());
    }

    /// A child whose own `emit` turns around and tries to add a sibling to
    /// the very `Children` it was just pushed through from — the scenario
    /// the re-entrancy guard exists for.
    struct ReentrantRecorder {
        id: u64,
        parent: Rc<Children<u64>>,
        attempt_result: RefCell<Option<Result<(), GraphError>>>,
    }

    impl GraphNode for ReentrantRecorder {
        fn node_id(&self) -> u64 {
            self.id
        }
        fn child_ids(&self) -> Vec<u64> {
            vec![]
        }
    }

    impl Sink<u64> for ReentrantRecorder {
        fn emit(self: Rc<Self>, _value: u64) -> Token {
            let sibling = Rc::new(Recorder {
                id: next_node_id(),
                seen: RefCell::new(vec![]),
            });
            *self.attempt_result.borrow_mut() = Some(self.parent.add(sibling));
            Token::done()
        }
    }

    #[test]
    fn emit_to_during_propagate_is_rejected() {
        let parent_id = next_node_id();
        let children = Rc::new(Children::new(parent_id));
        let reentrant = Rc::new(ReentrantRecorder {
            id: next_node_id(),
            parent: children.clone(),
            attempt_result: RefCell::new(None),
        });
        children.add(reentrant.clone()).unwrap();

        children.propagate(1);

        assert_eq!(
            *reentrant.attempt_result.borrow(),
            Some(Err(GraphError::ConcurrentMutation(parent_id)))
        );
        // The guard is released once propagate's synchronous fan-out is
        // done, so a later, non-reentrant `add` succeeds normally.
        let later = Rc::new(Recorder {
            id: next_node_id(),
            seen: RefCell::new(vec![]),
        });
        assert!(children.add(later).is_ok());
    }
}
