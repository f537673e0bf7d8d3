//! # Clock Interrupt and Timers
//!
//! Time moves only here. Each clock interrupt reads the tick counter from a
//! [`TimerDevice`], fires every timer due by then, and re-runs the scheduler.
//!
//! ## Philosophy
//!
//! **Determinism enables thorough testing.**
//!
//! [`SimClock`] is a tick source that only advances when told to, so a test
//! controls exactly which timers fire and in which order. Timers armed while
//! an interrupt is being handled fire on a later interrupt, never the
//! current one.

use crate::scheduler::PreemptionReason;
use crate::timer::Expired;
use crate::trace::KernelEvent;
use crate::{DemotionPolicy, Kernel, TimerAction};
use core_types::well_known::CLOCK;
use core_types::{Endpoint, Priority};
use hal::TimerDevice;
use kernel_api::{KernelCallNumber, KernelError, Tick, TimerHandle};

/// Simulated tick counter with controllable progression
///
/// # Examples
///
/// ```
/// use kernel_core::SimClock;
/// use hal::TimerDevice;
///
/// let mut clock = SimClock::new();
/// assert_eq!(clock.poll_ticks(), 0);
///
/// clock.advance_ticks(100);
/// assert_eq!(clock.poll_ticks(), 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    ticks: u64,
}

impl SimClock {
    /// Creates a clock at tick 0
    pub fn new() -> Self {
        Self { ticks: 0 }
    }

    /// Creates a clock starting at `ticks`
    pub fn with_initial_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Advances the clock
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow.
    pub fn advance_ticks(&mut self, delta: u64) {
        self.ticks = match self.ticks.checked_add(delta) {
            Some(ticks) => ticks,
            None => panic!("clock tick overflow"),
        };
    }

    /// Moves the clock forward to `new_ticks`
    ///
    /// # Panics
    ///
    /// Panics if `new_ticks` is behind the current count.
    pub fn set_ticks(&mut self, new_ticks: u64) {
        assert!(
            new_ticks >= self.ticks,
            "Cannot set ticks backwards: {} < {}",
            new_ticks,
            self.ticks
        );
        self.ticks = new_ticks;
    }

    /// Current count, without `&mut`
    pub fn current_ticks(&self) -> u64 {
        self.ticks
    }
}

impl TimerDevice for SimClock {
    fn poll_ticks(&mut self) -> u64 {
        self.ticks
    }
}

impl Kernel {
    /// Handles one clock interrupt
    ///
    /// A reading behind the kernel's current time is ignored.
    pub fn on_clock_interrupt(&mut self, device: &mut impl TimerDevice) {
        let ticks = Tick::new(device.poll_ticks());
        if ticks < self.now {
            log::warn!("clock went backwards: {} < {}", ticks, self.now);
            return;
        }
        self.now = ticks;

        for expired in self.timers.expire(ticks) {
            self.fire(expired);
        }
        self.run_scheduler();
    }

    /// Advances time one tick at a time, taking an interrupt per tick
    pub fn advance_ticks(&mut self, ticks: u64) {
        let mut clock = std::mem::take(&mut self.clock);
        if clock.current_ticks() < self.now.as_u64() {
            clock.set_ticks(self.now.as_u64());
        }
        for _ in 0..ticks {
            clock.advance_ticks(1);
            self.on_clock_interrupt(&mut clock);
        }
        self.clock = clock;
    }

    /// Arms a kernel-internal callback
    pub fn arm_watchdog(
        &mut self,
        deadline: Tick,
        callback: fn(&mut Kernel, u64),
        arg: u64,
    ) -> TimerHandle {
        self.timers
            .arm(deadline, TimerAction::Watchdog { callback, arg })
    }

    /// Cancels a watchdog; other kinds of timer are left alone
    pub fn cancel_watchdog(&mut self, handle: TimerHandle) -> bool {
        match self.timers.get(handle) {
            Some(TimerAction::Watchdog { .. }) => self.timers.cancel(handle),
            _ => false,
        }
    }

    pub(crate) fn do_arm_timer(
        &mut self,
        caller: Endpoint,
        deadline: Tick,
        arg: u64,
    ) -> Result<TimerHandle, KernelError> {
        self.require(caller, KernelCallNumber::ArmTimer)?;
        let handle = self.timers.arm(
            deadline,
            TimerAction::Alarm {
                owner: caller,
                arg,
            },
        );
        self.processes.live_mut(caller)?.alarms.push(handle);
        Ok(handle)
    }

    /// Cancelling an alarm that fired, or that the caller never owned, does nothing
    pub(crate) fn do_cancel_timer(
        &mut self,
        caller: Endpoint,
        handle: TimerHandle,
    ) -> Result<(), KernelError> {
        self.require(caller, KernelCallNumber::CancelTimer)?;
        let process = self.processes.live_mut(caller)?;
        if let Some(index) = process.alarms.iter().position(|h| *h == handle) {
            process.alarms.swap_remove(index);
            self.timers.cancel(handle);
        }
        Ok(())
    }

    fn fire(&mut self, expired: Expired<TimerAction>) {
        match expired.callback {
            TimerAction::QuantumExpired(endpoint) => self.expire_quantum(endpoint, expired.handle),
            TimerAction::Alarm { owner, arg } => {
                let Some(process) = self.processes.get_mut(owner) else {
                    return;
                };
                process.alarms.retain(|h| *h != expired.handle);
                process.alarm_arg = Some(arg);
                self.record(KernelEvent::TimerFired {
                    handle: expired.handle,
                });
                self.post_notification(CLOCK, owner);
            }
            TimerAction::Watchdog { callback, arg } => {
                self.record(KernelEvent::TimerFired {
                    handle: expired.handle,
                });
                callback(self, arg);
            }
        }
    }

    fn expire_quantum(&mut self, endpoint: Endpoint, handle: TimerHandle) {
        if self.scheduler.current() != Some(endpoint) {
            return;
        }
        let system = self.privileges.is_system(endpoint);
        let demotion = self.config.scheduler.demotion;
        let Some(process) = self.processes.get_mut(endpoint) else {
            return;
        };
        if process.quantum_timer.map(|q| q.handle) != Some(handle) {
            return;
        }

        process.quantum_timer = None;
        process.ticks_left = process.quantum;
        if let DemotionPolicy::OneLevel { lowest } = demotion {
            if !system && process.priority.0 < lowest {
                process.priority = Priority(process.priority.0 + 1);
            }
        }
        let priority = process.priority;

        self.scheduler
            .preempt_current(priority, PreemptionReason::QuantumExpired, self.now);
        self.record(KernelEvent::QuantumExpired { endpoint, priority });
    }
}
