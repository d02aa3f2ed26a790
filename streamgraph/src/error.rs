use std::cell::RefCell;

use thiserror::Error;

/// Errors raised while wiring the graph together (`emit_to`, node construction).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("adding this edge would close a cycle through node {0}")]
    Cycle(u64),

    #[error("node {0} was mutated (a child added) while one of its own emits was in flight")]
    ConcurrentMutation(u64),
}

/// Errors raised by the timer/duration inputs to time-aware operators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    #[error("interval must be strictly positive, got {0:?}")]
    NonPositiveInterval(std::time::Duration),
}

/// Errors surfaced from a completion [`crate::types::Token`].
///
/// A user closure that panics (in `map`, `filter`, `scan`, or a sink
/// callback) is caught with [`std::panic::catch_unwind`] and converted into
/// `OperatorError::Panicked` rather than unwinding across the graph — there
/// is no other way for spec-level "the callback raised" semantics to exist
/// in a language without exceptions.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("{node_type} (node {node}) failed: {source}")]
    Failed {
        node: u64,
        node_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{node_type} (node {node}) panicked: {message}")]
    Panicked {
        node: u64,
        node_type: String,
        message: String,
    },
}

impl OperatorError {
    /// `node_type` is the node's [`crate::graph::GraphNode::type_name`] —
    /// callers pass `self.type_name()` rather than `std::any::type_name`
    /// directly, since the latter includes the full module path and any
    /// generic parameters, which is too noisy for this error's `Display`.
    pub fn failed(node: u64, node_type: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        OperatorError::Failed {
            node,
            node_type: node_type.into(),
            source: source.into(),
        }
    }

    pub fn from_panic(
        node: u64,
        node_type: impl Into<String>,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        OperatorError::Panicked {
            node,
            node_type: node_type.into(),
            message,
        }
    }
}

/// An internal-only signal meaning "the bounded queue was full"; `buffer`
/// converts this into a suspended [`crate::types::Token`] rather than
/// letting it reach a caller as an error, so it deliberately has no
/// `thiserror` display/derive surface beyond what's needed internally.
#[derive(Debug)]
pub(crate) struct QueueFullError;

type ErrorHook = Box<dyn Fn(&OperatorError)>;

thread_local! {
    static ERROR_HOOK: RefCell<ErrorHook> = RefCell::new(Box::new(default_error_hook));
}

fn default_error_hook(err: &OperatorError) {
    log::error!("{err}");
}

/// Installs a hook invoked when a timer-driven operator (`Counter`,
/// `rate_limit`, `delay`, `timed_window`) fails with no caller awaiting its
/// token. Defaults to logging via `log::error!`.
pub fn set_error_hook(hook: impl Fn(&OperatorError) + 'static) {
    ERROR_HOOK.with(|cell| *cell.borrow_mut() = Box::new(hook));
}

pub(crate) fn report_unawaited_error(err: &OperatorError) {
    ERROR_HOOK.with(|cell| (cell.borrow())(err));
}
