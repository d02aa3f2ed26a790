mod buffer;
mod counter;
mod delay;
mod filter;
mod map;
mod partition;
mod rate_limit;
mod scan;
mod sink;
mod sliding_window;
mod source;
mod timed_window;

pub use buffer::BufferStream;
pub use counter::Counter;
pub use delay::DelayStream;
pub use filter::FilterStream;
pub use map::MapStream;
pub use partition::PartitionStream;
pub use rate_limit::RateLimitStream;
pub use scan::ScanStream;
pub use sink::{sink_to_list, FileSink, SinkStream};
pub use sliding_window::SlidingWindowStream;
pub use source::SourceStream;
pub use timed_window::TimedWindowStream;

use std::cell::RefCell;
use std::fmt::Display;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::types::{Element, SinkOutcome, Stream};

/// Method-chaining surface over any `Stream<T>`, mirroring wingfoil's
/// `StreamOperators` extension trait. Every free function below
/// (`map`, `filter`, ...) constructs the same operator node; the two forms
/// exist side by side because the system this crate implements names its
/// operators as free functions, and wingfoil itself offers both shapes.
pub trait StreamOperators<T: Element>: Stream<T> {
    fn map<OUT: Element>(
        self: Rc<Self>,
        func: impl Fn(T) -> OUT + 'static,
    ) -> Rc<MapStream<T, OUT>> {
        MapStream::new(func, self)
    }

    fn filter(self: Rc<Self>, predicate: impl Fn(&T) -> bool + 'static) -> Rc<FilterStream<T>> {
        FilterStream::new(predicate, self)
    }

    fn scan<OUT: Element>(
        self: Rc<Self>,
        func: impl Fn(&OUT, T) -> OUT + 'static,
        start: OUT,
    ) -> Rc<ScanStream<T, OUT>> {
        ScanStream::new(func, start, self)
    }

    fn partition(self: Rc<Self>, size: usize) -> Rc<PartitionStream<T>> {
        PartitionStream::new(size, self)
    }

    fn sliding_window(self: Rc<Self>, size: usize) -> Rc<SlidingWindowStream<T>> {
        SlidingWindowStream::new(size, self)
    }

    fn timed_window(self: Rc<Self>, interval: Duration) -> Rc<TimedWindowStream<T>> {
        TimedWindowStream::new(interval, self)
    }

    fn rate_limit(self: Rc<Self>, interval: Duration) -> Rc<RateLimitStream<T>> {
        RateLimitStream::new(interval, self)
    }

    fn delay(self: Rc<Self>, interval: Duration) -> Rc<DelayStream<T>> {
        DelayStream::new(interval, self)
    }

    fn buffer(self: Rc<Self>, capacity: usize) -> Rc<BufferStream<T>> {
        BufferStream::new(capacity, self)
    }

    fn sink(self: Rc<Self>, func: impl Fn(T) -> SinkOutcome + 'static) -> Rc<SinkStream<T>> {
        SinkStream::new(self, func)
    }

    fn sink_to_list(self: Rc<Self>) -> Rc<RefCell<Vec<T>>> {
        sink::sink_to_list(self)
    }
}

impl<T: Element, S: Stream<T> + ?Sized> StreamOperators<T> for S {}

/// Free-function constructors, named to match the system's own vocabulary
/// (`map(f, src)` rather than only `src.map(f)`).
pub fn map<IN: Element, OUT: Element>(
    func: impl Fn(IN) -> OUT + 'static,
    upstream: Rc<dyn Stream<IN>>,
) -> Rc<MapStream<IN, OUT>> {
    MapStream::new(func, upstream)
}

pub fn filter<T: Element>(
    predicate: impl Fn(&T) -> bool + 'static,
    upstream: Rc<dyn Stream<T>>,
) -> Rc<FilterStream<T>> {
    FilterStream::new(predicate, upstream)
}

pub fn scan<IN: Element, OUT: Element>(
    func: impl Fn(&OUT, IN) -> OUT + 'static,
    upstream: Rc<dyn Stream<IN>>,
    start: OUT,
) -> Rc<ScanStream<IN, OUT>> {
    ScanStream::new(func, start, upstream)
}

pub fn partition<T: Element>(size: usize, upstream: Rc<dyn Stream<T>>) -> Rc<PartitionStream<T>> {
    PartitionStream::new(size, upstream)
}

pub fn sliding_window<T: Element>(
    size: usize,
    upstream: Rc<dyn Stream<T>>,
) -> Rc<SlidingWindowStream<T>> {
    SlidingWindowStream::new(size, upstream)
}

pub fn timed_window<T: Element>(
    interval: Duration,
    upstream: Rc<dyn Stream<T>>,
) -> Rc<TimedWindowStream<T>> {
    TimedWindowStream::new(interval, upstream)
}

pub fn rate_limit<T: Element>(
    interval: Duration,
    upstream: Rc<dyn Stream<T>>,
) -> Rc<RateLimitStream<T>> {
    RateLimitStream::new(interval, upstream)
}

pub fn delay<T: Element>(interval: Duration, upstream: Rc<dyn Stream<T>>) -> Rc<DelayStream<T>> {
    DelayStream::new(interval, upstream)
}

pub fn buffer<T: Element>(capacity: usize, upstream: Rc<dyn Stream<T>>) -> Rc<BufferStream<T>> {
    BufferStream::new(capacity, upstream)
}

pub fn sink_to_file<T: Element + Display>(
    path: impl AsRef<Path>,
    upstream: Rc<dyn Stream<T>>,
) -> io::Result<Rc<FileSink<T>>> {
    FileSink::new(path, upstream)
}

/// Matches the system's own free-function spelling for the tick source.
#[allow(non_snake_case)]
pub fn Counter(interval: Duration) -> Rc<counter::Counter> {
    counter::Counter::new(interval)
}
