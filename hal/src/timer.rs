//! # Clock Tick Source
//!
//! Hardware abstraction for the periodic clock interrupt.
//!
//! ## Philosophy
//!
//! **Time is a device, not a global variable.**
//!
//! The kernel core reads the tick counter once per clock interrupt and
//! expires software timers up to that tick. The device does not:
//! - Provide wall-clock time
//! - Block or sleep
//! - Decide anything about scheduling
//!
//! ## Design Principles
//!
//! 1. **Monotonic**: Ticks never go backwards
//! 2. **Non-blocking**: Always returns immediately
//! 3. **Cumulative**: Returns total ticks since boot, so a missed interrupt
//!    is caught up on the next one

/// Clock tick source
///
/// # Examples
///
/// ```
/// use hal::TimerDevice;
///
/// fn ticks_elapsed<T: TimerDevice>(clock: &mut T, since: u64) -> u64 {
///     clock.poll_ticks().saturating_sub(since)
/// }
/// ```
pub trait TimerDevice {
    /// Returns the total number of ticks since boot
    ///
    /// Must never return a smaller value than a previous call.
    fn poll_ticks(&mut self) -> u64;
}

impl<T: TimerDevice + ?Sized> TimerDevice for &mut T {
    fn poll_ticks(&mut self) -> u64 {
        (**self).poll_ticks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StepClock {
        ticks: u64,
        step: u64,
    }

    impl TimerDevice for StepClock {
        fn poll_ticks(&mut self) -> u64 {
            self.ticks += self.step;
            self.ticks
        }
    }

    fn read_twice<T: TimerDevice>(mut clock: T) -> (u64, u64) {
        (clock.poll_ticks(), clock.poll_ticks())
    }

    #[test]
    fn test_clock_monotonic() {
        let mut clock = StepClock { ticks: 0, step: 3 };
        let t1 = clock.poll_ticks();
        let t2 = clock.poll_ticks();
        assert!(t2 > t1);
        assert_eq!(t2 - t1, 3);
    }

    #[test]
    fn test_mut_ref_forwards() {
        let mut clock = StepClock { ticks: 10, step: 1 };
        let (a, b) = read_twice(&mut clock);
        assert_eq!((a, b), (11, 12));
        assert_eq!(clock.ticks, 12);
    }
}
