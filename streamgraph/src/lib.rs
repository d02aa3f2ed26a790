//! A push-based streaming dataflow core: values are pushed through a DAG of
//! operator nodes rather than pulled on a cycle schedule, and every `emit`
//! returns a completion [`Token`] that only resolves once every downstream
//! sink has acknowledged the value — so a producer that doesn't await its
//! token's completion can run ahead of a slow consumer, and one that does
//! gets backpressure for free.
//!
//! ```
//! use streamgraph::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let source = SourceStream::<u64>::new();
//!     let doubled = source.clone().map(|x| x * 2);
//!     let out = doubled.sink_to_list();
//!
//!     for i in 0..4u64 {
//!         source.clone().emit(i).await.unwrap();
//!     }
//!     assert_eq!(*out.borrow(), vec![0, 2, 4, 6]);
//! }
//! ```
//!
//! ## Time-aware operators
//!
//! `rate_limit`, `delay`, `timed_window` and `Counter` own a background
//! task on the crate's single-threaded event loop (a `tokio` current-thread
//! `Runtime` plus `LocalSet` — see [`event_loop`]) and cancel it when the
//! node is dropped. Their failures, when nothing is awaiting the node's
//! token, are reported through [`set_error_hook`] rather than lost.
//!
//! ## Concurrency model
//!
//! All graph state is `Rc`/`RefCell`, never `Arc`/`Mutex` — there is one
//! thread, so the only thing to guard against is re-entrancy, which the
//! graph's edge registry and per-node re-entrancy guard do directly (see
//! [`GraphError`]).

#[macro_use]
extern crate log;
extern crate derive_new;

mod error;
mod event_loop;
mod graph;
mod nodes;
mod time;
mod types;

pub use error::{set_error_hook, GraphError, OperatorError, TimingError};
pub use event_loop::{bounded_queue, now, sleep, spawn_local, QueueReceiver, QueueSender};
pub use graph::GraphNode;
pub use nodes::*;
pub use time::NanoTime;
pub use types::{Children, Element, Sink, SinkOutcome, Stream, Token};
