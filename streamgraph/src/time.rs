use derive_new::new;
use quanta::Clock;
use std::convert::From;
use std::ops::{Add, Sub};
use std::sync::LazyLock;
use std::time::Duration;

type RawTime = u64;

static CLOCK: LazyLock<Clock> = LazyLock::new(Clock::new);

/// A monotonic time in nanoseconds, read from [`NanoTime::now`].
///
/// Operators that need "now" (`rate_limit`, `delay`, `timed_window`,
/// `Counter`) read it through [`crate::event_loop::EventLoop::now`] rather
/// than calling this directly, so that a single instant is shared across a
/// cycle of suspension points.
#[derive(new, Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NanoTime(RawTime);

impl NanoTime {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(RawTime::MAX);
    pub const NANOS_PER_SECOND: RawTime = 1_000_000_000;

    pub fn now() -> Self {
        Self(CLOCK.now().as_u64())
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / Self::NANOS_PER_SECOND as f64
    }
}

impl std::fmt::Display for NanoTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}

impl From<u64> for NanoTime {
    fn from(t: u64) -> Self {
        NanoTime(t)
    }
}

impl From<Duration> for NanoTime {
    fn from(dur: Duration) -> Self {
        Self(dur.as_secs() as RawTime * Self::NANOS_PER_SECOND + dur.subsec_nanos() as RawTime)
    }
}

impl From<NanoTime> for u64 {
    fn from(t: NanoTime) -> Self {
        t.0
    }
}

impl From<NanoTime> for Duration {
    fn from(t: NanoTime) -> Self {
        Duration::from_nanos(u64::from(t))
    }
}

impl Add<NanoTime> for NanoTime {
    type Output = Self;
    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl Add<Duration> for NanoTime {
    type Output = Self;
    fn add(self, other: Duration) -> Self::Output {
        Self(self.0 + other.as_nanos() as RawTime)
    }
}

/// Saturating: elapsed time is never negative even if clocks are equal.
impl Sub<NanoTime> for NanoTime {
    type Output = Self;
    fn sub(self, other: Self) -> Self::Output {
        Self(self.0.saturating_sub(other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_roundtrip() {
        let d = Duration::from_millis(1_500);
        let t = NanoTime::from(d);
        assert_eq!(Duration::from(t), d);
    }

    #[test]
    fn saturating_sub_never_negative() {
        let a = NanoTime::new(100);
        let b = NanoTime::new(200);
        assert_eq!(a - b, NanoTime::ZERO);
    }

    #[test]
    fn now_is_monotonic_ish() {
        let a = NanoTime::now();
        let b = NanoTime::now();
        assert!(b >= a);
    }
}
