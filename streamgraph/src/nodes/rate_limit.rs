use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{GraphError, OperatorError, TimingError};
use crate::event_loop;
use crate::graph::{next_node_id, GraphNode};
use crate::time::NanoTime;
use crate::types::{Children, Element, Sink, Stream, Token};

/// Spaces propagated values at least `interval` apart. Unlike `delay`,
/// `rate_limit`'s own completion is the spacing wait plus the downstream
/// token — a producer pushing faster than `interval` is itself slowed down,
/// which is the backpressure `test_rate_limit` exercises.
///
/// `emit`s are serialized through an internal async `Mutex` guarding
/// `last_emit`: a second `emit` arriving while one is still waiting out its
/// interval (or awaiting its propagation) queues behind it rather than
/// racing it to read a stale `last_emit`, matching the spec's `{idle,
/// waiting, propagating}` state machine.
pub struct RateLimitStream<T: Element> {
    id: u64,
    interval: Duration,
    last_emit: Rc<Mutex<Option<NanoTime>>>,
    children: Rc<Children<T>>,
}

impl<T: Element> RateLimitStream<T> {
    pub fn new(interval: Duration, upstream: Rc<dyn Stream<T>>) -> Rc<Self> {
        assert!(
            !interval.is_zero(),
            "{}",
            TimingError::NonPositiveInterval(interval)
        );
        let id = next_node_id();
        let node = Rc::new(RateLimitStream {
            id,
            interval,
            last_emit: Rc::new(Mutex::new(None)),
            children: Rc::new(Children::new(id)),
        });
        upstream
            .emit_to(node.clone())
            .expect("a freshly allocated node id cannot close a cycle");
        node
    }
}

impl<T: Element> GraphNode for RateLimitStream<T> {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl<T: Element> Sink<T> for RateLimitStream<T> {
    fn emit(self: Rc<Self>, value: T) -> Token {
        let id = self.id;
        let type_name = self.type_name();
        let interval = self.interval;
        let last_emit = self.last_emit.clone();
        let children = self.children.clone();
        // Spawned eagerly (not just wrapped in a lazy async block) so the
        // wait-then-propagate sequence runs even if the caller drops the
        // returned token without awaiting it.
        let handle = event_loop::spawn_local(async move {
            let mut last_emit = last_emit.lock().await;
            let wait = last_emit.map(|previous| {
                let elapsed = Duration::from(event_loop::now() - previous);
                interval.saturating_sub(elapsed)
            });
            if let Some(wait) = wait {
                if !wait.is_zero() {
                    event_loop::sleep(wait).await;
                }
            }
            let result = children.propagate(value).await;
            *last_emit = Some(event_loop::now());
            result
        });
        Token::pending(async move {
            handle.await.unwrap_or_else(|join_err| {
                Err(OperatorError::failed(id, type_name, anyhow::anyhow!(join_err)))
            })
        })
    }
}

impl<T: Element> Stream<T> for RateLimitStream<T> {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<T>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}
