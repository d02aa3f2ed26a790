use std::rc::Rc;
use std::time::Duration;

use crate::error::{report_unawaited_error, GraphError, TimingError};
use crate::event_loop;
use crate::graph::{next_node_id, GraphNode};
use crate::types::{Children, Sink, Stream, Token};

/// A source with no upstream: emits a monotonically increasing `u64`
/// (starting at 1) every `interval` for as long as it is kept alive. Its
/// only configuration is the interval, matching the original
/// implementation this crate's scenarios were distilled from.
pub struct Counter {
    id: u64,
    children: Rc<Children<u64>>,
    task: std::cell::RefCell<Option<tokio::task::JoinHandle<()>>>,
}

impl Counter {
    pub fn new(interval: Duration) -> Rc<Self> {
        assert!(
            !interval.is_zero(),
            "{}",
            TimingError::NonPositiveInterval(interval)
        );
        let id = next_node_id();
        let children = Rc::new(Children::new(id));

        let tick_children = children.clone();
        let task = event_loop::spawn_local(async move {
            let mut count: u64 = 0;
            loop {
                event_loop::sleep(interval).await;
                count += 1;
                if let Err(err) = tick_children.propagate(count).await {
                    report_unawaited_error(&err);
                }
            }
        });

        Rc::new(Counter {
            id,
            children,
            task: std::cell::RefCell::new(Some(task)),
        })
    }
}

impl GraphNode for Counter {
    fn node_id(&self) -> u64 {
        self.id
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children.ids()
    }
}

impl Sink<u64> for Counter {
    fn emit(self: Rc<Self>, value: u64) -> Token {
        self.children.propagate(value)
    }
}

impl Stream<u64> for Counter {
    fn emit_to(self: Rc<Self>, child: Rc<dyn Sink<u64>>) -> Result<(), GraphError> {
        self.children.add(child)
    }

    fn detach(&self, child_id: u64) {
        self.children.remove(child_id)
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::block_on_local;
    use crate::nodes::sink_to_list;

    #[test]
    fn counter_ticks_at_least_once() {
        let counter = Counter::new(Duration::from_millis(10));
        let out = sink_to_list(counter.clone());
        block_on_local(async {
            event_loop::sleep(Duration::from_millis(100)).await;
        });
        assert!(!out.borrow().is_empty());
        drop(counter);
    }
}
