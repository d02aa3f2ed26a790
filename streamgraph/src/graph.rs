//! Graph-construction bookkeeping: node ids, the edge registry used to
//! reject cycles, and the per-node re-entrancy guard used to reject
//! concurrent mutation of a node's children while one of its own emits is
//! in flight.
//!
//! Wingfoil's `graph.rs` owns cycling a dirty-node schedule; this crate has
//! no such schedule (values are pushed synchronously down from whichever
//! node `emit` was called on), so what remains of "the graph" is purely
//! this adjacency bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use crate::error::GraphError;

thread_local! {
    static NEXT_NODE_ID: Cell<u64> = const { Cell::new(0) };
    static EDGES: RefCell<HashMap<u64, Vec<u64>>> = RefCell::new(HashMap::new());
}

/// Every constructed node gets a fresh id from this counter; there is one
/// counter per thread because the graph itself never crosses threads.
pub fn next_node_id() -> u64 {
    NEXT_NODE_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}

/// Type-erased identity and fan-out shape of a graph node, implemented by
/// every operator and sink so the cycle-detection registry can walk the
/// graph without knowing the element type of each edge.
pub trait GraphNode {
    fn node_id(&self) -> u64;
    fn child_ids(&self) -> Vec<u64>;

    /// The operator's type name (`MapStream`, `RateLimitStream`, ...),
    /// used only for diagnostics (log lines, `OperatorError` display).
    /// Mirrors wingfoil's `MutableNode::type_name`.
    fn type_name(&self) -> String {
        tynm::type_name::<Self>()
    }
}

/// Records a prospective `parent -> child` edge and returns an error instead
/// of registering it if the edge would close a cycle back to `parent`.
pub(crate) fn try_register_edge(parent: u64, child: u64) -> Result<(), GraphError> {
    if parent == child || reaches(child, parent) {
        return Err(GraphError::Cycle(parent));
    }
    EDGES.with(|edges| {
        edges.borrow_mut().entry(parent).or_default().push(child);
    });
    Ok(())
}

/// BFS reachability: can `from` reach `to` through already-registered edges?
fn reaches(from: u64, to: u64) -> bool {
    if from == to {
        return true;
    }
    EDGES.with(|edges| {
        let edges = edges.borrow();
        let mut queue = VecDeque::from([from]);
        let mut seen = std::collections::HashSet::from([from]);
        while let Some(node) = queue.pop_front() {
            let Some(children) = edges.get(&node) else {
                continue;
            };
            for &child in children {
                if child == to {
                    return true;
                }
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    })
}

/// Re-entrancy guard for a single node: flips true for the duration of that
/// node's own `emit`, so a child being attached to it via `emit_to` from
/// inside a user callback invoked during that same emit is rejected rather
/// than silently racing the in-flight fan-out.
#[derive(Default)]
pub(crate) struct ReentrancyGuard(Cell<bool>);

impl ReentrancyGuard {
    pub(crate) fn enter(&self, node_id: u64) -> Result<ReentrancyTicket<'_>, GraphError> {
        if self.0.get() {
            return Err(GraphError::ConcurrentMutation(node_id));
        }
        self.0.set(true);
        Ok(ReentrancyTicket(&self.0))
    }

    pub(crate) fn check(&self, node_id: u64) -> Result<(), GraphError> {
        if self.0.get() {
            Err(GraphError::ConcurrentMutation(node_id))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct ReentrancyTicket<'a>(&'a Cell<bool>);

impl Drop for ReentrancyTicket<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_is_not_a_cycle() {
        let a = next_node_id();
        let b = next_node_id();
        let c = next_node_id();
        assert!(try_register_edge(a, b).is_ok());
        assert!(try_register_edge(b, c).is_ok());
    }

    #[test]
    fn closing_edge_is_rejected() {
        let a = next_node_id();
        let b = next_node_id();
        let c = next_node_id();
        try_register_edge(a, b).unwrap();
        try_register_edge(b, c).unwrap();
        assert_eq!(try_register_edge(c, a), Err(GraphError::Cycle(c)));
    }

    #[test]
    fn self_loop_is_rejected() {
        let a = next_node_id();
        assert_eq!(try_register_edge(a, a), Err(GraphError::Cycle(a)));
    }

    #[test]
    fn reentrancy_guard_blocks_nested_entry() {
        let guard = ReentrancyGuard::default();
        let _ticket = guard.enter(1).unwrap();
        assert_eq!(guard.check(1), Err(GraphError::ConcurrentMutation(1)));
    }
}
