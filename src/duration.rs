//! Duration value type used to express wait timeouts
//!
//! A [`Duration`] stores a nanosecond count and is parameterized by the
//! [`Tick`] unit it was created in. Each unit documents the smallest and
//! largest tick count it can represent; values outside that range are
//! reported as [`DurationError::Overflow`] or [`DurationError::Underflow`]
//! instead of being clamped.
//!
//! ```
//! use tasknode::duration::{Duration, Milliseconds, Nanoseconds, Seconds, Tick};
//!
//! let d = Duration::<Nanoseconds>::try_new(1_000_000_000).unwrap();
//! assert_eq!(d.as_ticks::<Seconds>().unwrap(), 1);
//!
//! let max = Duration::<Seconds>::max();
//! assert_eq!(max.as_ticks::<Milliseconds>().unwrap(), Seconds::max() * 1_000);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::time::Instant;

use thiserror::Error;

/// Largest duration, in seconds (one week).
pub const MAX_SECONDS: u64 = 60 * 60 * 24 * 7;

/// Smallest non-zero duration, in nanoseconds.
pub const MIN_NANOSECONDS: u64 = 1_000;

/// Duration conversion errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration overflow: {ticks} {unit} exceeds the maximum")]
    Overflow { ticks: u64, unit: &'static str },

    #[error("duration underflow: {ticks} {unit} is below the minimum")]
    Underflow { ticks: u64, unit: &'static str },
}

/// A time unit for [`Duration`].
pub trait Tick: Copy + fmt::Debug + Send + Sync + 'static {
    /// Unit name for diagnostics.
    const NAME: &'static str;
    /// Number of nanoseconds in one tick.
    const NANOS_PER_TICK: u64;

    /// Smallest non-zero tick count.
    fn min() -> u64 {
        MIN_NANOSECONDS.div_ceil(Self::NANOS_PER_TICK).max(1)
    }

    /// Largest tick count.
    fn max() -> u64 {
        MAX_SECONDS * (1_000_000_000 / Self::NANOS_PER_TICK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milliseconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Microseconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nanoseconds;

impl Tick for Seconds {
    const NAME: &'static str = "seconds";
    const NANOS_PER_TICK: u64 = 1_000_000_000;
}

impl Tick for Milliseconds {
    const NAME: &'static str = "milliseconds";
    const NANOS_PER_TICK: u64 = 1_000_000;
}

impl Tick for Microseconds {
    const NAME: &'static str = "microseconds";
    const NANOS_PER_TICK: u64 = 1_000;
}

impl Tick for Nanoseconds {
    const NAME: &'static str = "nanoseconds";
    const NANOS_PER_TICK: u64 = 1;
}

/// A duration expressed in ticks of `T`.
pub struct Duration<T: Tick> {
    nanos: u64,
    _unit: PhantomData<T>,
}

impl<T: Tick> Duration<T> {
    fn from_nanos(nanos: u64) -> Self {
        Self {
            nanos,
            _unit: PhantomData,
        }
    }

    /// The zero duration.
    #[inline]
    pub fn zero() -> Self {
        Self::from_nanos(0)
    }

    /// The largest representable duration.
    #[inline]
    pub fn max() -> Self {
        Self::from_nanos(MAX_SECONDS * Seconds::NANOS_PER_TICK)
    }

    /// Create a duration from a tick count, reporting out-of-range values.
    pub fn try_new(ticks: u64) -> Result<Self, DurationError> {
        if ticks == 0 {
            return Ok(Self::zero());
        }
        if ticks > T::max() {
            return Err(DurationError::Overflow {
                ticks,
                unit: T::NAME,
            });
        }
        if ticks < T::min() {
            return Err(DurationError::Underflow {
                ticks,
                unit: T::NAME,
            });
        }
        Ok(Self::from_nanos(ticks * T::NANOS_PER_TICK))
    }

    /// Create a duration from a tick count.
    ///
    /// # Panics
    ///
    /// Panics if `ticks` is outside `[T::min(), T::max()]` (zero is allowed).
    pub fn new(ticks: u64) -> Self {
        match Self::try_new(ticks) {
            Ok(d) => d,
            Err(e) => panic!("setting duration from {}: {}", T::NAME, e),
        }
    }

    /// Tick count in this duration's own unit.
    #[inline]
    pub fn count(&self) -> u64 {
        self.nanos / T::NANOS_PER_TICK
    }

    /// Tick count in another unit, truncating toward zero.
    ///
    /// A non-zero duration that truncates to zero ticks is an underflow.
    pub fn as_ticks<U: Tick>(&self) -> Result<u64, DurationError> {
        let ticks = self.nanos / U::NANOS_PER_TICK;
        if ticks == 0 && self.nanos != 0 {
            return Err(DurationError::Underflow {
                ticks: self.nanos,
                unit: Nanoseconds::NAME,
            });
        }
        Ok(ticks)
    }

    /// Re-express this duration in another unit.
    pub fn convert<U: Tick>(&self) -> Result<Duration<U>, DurationError> {
        let ticks = self.as_ticks::<U>()?;
        Duration::<U>::try_new(ticks)
    }

    /// Sum of two durations, reporting overflow past [`MAX_SECONDS`].
    pub fn checked_add(
        &self,
        other: &Self,
    ) -> Result<Self, DurationError> {
        let nanos = self.nanos + other.nanos;
        if nanos > Self::max().nanos {
            return Err(DurationError::Overflow {
                ticks: nanos / T::NANOS_PER_TICK,
                unit: T::NAME,
            });
        }
        Ok(Self::from_nanos(nanos))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Convert to a standard library duration.
    #[inline]
    pub fn to_std(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.nanos)
    }
}

impl<T: Tick> Clone for Duration<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Tick> Copy for Duration<T> {}

impl<T: Tick> PartialEq for Duration<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.nanos == other.nanos
    }
}

impl<T: Tick> Eq for Duration<T> {}

impl<T: Tick> PartialOrd for Duration<T> {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Tick> Ord for Duration<T> {
    fn cmp(
        &self,
        other: &Self,
    ) -> std::cmp::Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl<T: Tick> Default for Duration<T> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<T: Tick> fmt::Debug for Duration<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Duration({} {})", self.count(), T::NAME)
    }
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Check once and return.
    Immediate,
    /// Wait until the condition holds.
    #[default]
    Infinite,
    /// Wait at most this long.
    After(std::time::Duration),
}

impl Timeout {
    /// Bounded timeout in milliseconds.
    #[inline]
    pub fn millis(ms: u64) -> Self {
        Timeout::After(std::time::Duration::from_millis(ms))
    }

    /// Absolute deadline, `None` for an infinite wait.
    ///
    /// A bound too far out to be represented as an [`Instant`] waits
    /// forever.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Immediate => Some(Instant::now()),
            Timeout::Infinite => None,
            Timeout::After(d) => Instant::now().checked_add(*d),
        }
    }
}

impl<T: Tick> From<Duration<T>> for Timeout {
    fn from(d: Duration<T>) -> Self {
        if d.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(d.to_std())
        }
    }
}

impl From<std::time::Duration> for Timeout {
    fn from(d: std::time::Duration) -> Self {
        if d.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(d)
        }
    }
}
