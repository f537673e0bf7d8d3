//! Time abstractions
//!
//! Kernel time is counted in clock ticks. There is no wall-clock time in the
//! core; a tick is whatever the clock device says it is.

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in kernel time
///
/// Ticks are monotonic. In the simulated kernel they only move when the
/// clock interrupt is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(u64);

impl Tick {
    /// The boot tick
    pub const ZERO: Tick = Tick(0);

    /// Creates a tick from its raw count
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the raw count
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the ticks elapsed since an earlier tick (zero if not earlier)
    pub fn ticks_since(&self, earlier: Tick) -> Ticks {
        Ticks(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Ticks> for Tick {
    type Output = Tick;

    fn add(self, ticks: Ticks) -> Self::Output {
        Tick(self.0.saturating_add(ticks.0))
    }
}

impl Sub<Ticks> for Tick {
    type Output = Tick;

    fn sub(self, ticks: Ticks) -> Self::Output {
        Tick(self.0.saturating_sub(ticks.0))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A number of ticks
///
/// Kept distinct from [`Tick`] so a duration can never be passed where an
/// absolute deadline is expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticks(pub u64);

impl Ticks {
    /// No time at all
    pub const ZERO: Ticks = Ticks(0);

    /// Returns the count
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// True for a zero-length duration
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for Ticks {
    type Output = Ticks;

    fn add(self, other: Ticks) -> Self::Output {
        Ticks(self.0.saturating_add(other.0))
    }
}

impl Sub for Ticks {
    type Output = Ticks;

    fn sub(self, other: Ticks) -> Self::Output {
        Ticks(self.0.saturating_sub(other.0))
    }
}

/// Handle of an armed timer
///
/// Handles are issued from a monotonic counter and never reused, so a
/// handle whose timer already fired or was cancelled stays harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}
