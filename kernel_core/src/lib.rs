//! # Kernel Core
//!
//! The single-CPU kernel state machine: rendezvous IPC, notifications and
//! asynchronous rings, a multi-level priority scheduler driven by quantum
//! timers, per-process grant tables with validated safe copy, a privilege
//! map, and a timer queue advanced by the clock interrupt.
//!
//! ## Philosophy
//!
//! **The kernel is a pure state machine.**
//!
//! Every entry point takes the calling endpoint and returns a result. There
//! is no hidden CPU: the "running" process is whatever the scheduler last
//! selected, and time moves only when [`Kernel::on_clock_interrupt`] or
//! [`Kernel::advance_ticks`] is called. This makes the whole kernel testable
//! under `cargo test` with deterministic interleavings.
//!
//! ## Layout
//!
//! - [`process`]: descriptors and the generation-tagged process table
//! - [`scheduler`]: FIFO-per-level ready queues
//! - [`timer`]: deadline-ordered timer queue
//! - [`grant`]: grant tables and safe copy
//! - [`privilege`]: who may send to whom and make which calls
//! - [`clock`]: the clock interrupt and timer dispatch
//! - [`lifecycle`]: spawn, kill, stop and friends
//! - [`syscall_gate`]: audited dispatch of [`kernel_api::KernelCall`]s
//!
//! Every [`KernelApi`](kernel_api::KernelApi) call ends by re-running the
//! scheduler, so a higher-priority process woken by the call is dispatched
//! before the call returns.

pub mod address_space;
mod api;
pub mod async_ring;
pub mod clock;
pub mod config;
pub mod grant;
pub mod lifecycle;
pub mod privilege;
pub mod process;
mod rendezvous;
pub mod scheduler;
pub mod syscall_gate;
pub mod test_utils;
pub mod timer;
pub mod trace;

pub use clock::SimClock;
pub use config::{
    ConfigError, DemotionPolicy, GrantConfig, IpcConfig, KernelConfig, SchedulerConfig,
};
pub use grant::{Grant, GrantTarget};
pub use process::{Hold, Process, ProcessKind, RunState};
pub use syscall_gate::{SyscallEvent, SyscallGate};
pub use trace::{DeliveryKind, KernelEvent, KernelTrace, TraceRecord};

use address_space::AddressSpace;
use core_types::well_known::{CLOCK, SYSTEM};
use core_types::{Endpoint, MemRange, Priority};
use grant::GrantTables;
use kernel_api::{
    IpcCompletion, KernelCallNumber, KernelError, Privileges, Tick, Ticks,
};
use privilege::PrivilegeMap;
use process::{ProcessTable, QuantumTimer};
use scheduler::{PreemptionReason, Scheduler};
use std::fmt;
use timer::TimerQueue;

/// What the kernel does when a timer expires
#[derive(Clone, Copy)]
pub enum TimerAction {
    /// The running process used up its quantum
    QuantumExpired(Endpoint),
    /// A process alarm; `owner` is notified from CLOCK
    Alarm { owner: Endpoint, arg: u64 },
    /// Kernel-internal callback
    Watchdog {
        callback: fn(&mut Kernel, u64),
        arg: u64,
    },
}

impl fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerAction::QuantumExpired(endpoint) => {
                f.debug_tuple("QuantumExpired").field(endpoint).finish()
            }
            TimerAction::Alarm { owner, arg } => f
                .debug_struct("Alarm")
                .field("owner", owner)
                .field("arg", arg)
                .finish(),
            TimerAction::Watchdog { arg, .. } => {
                f.debug_struct("Watchdog").field("arg", arg).finish_non_exhaustive()
            }
        }
    }
}

/// Kernel state
///
/// All tables are sized once from [`KernelConfig`] at boot.
pub struct Kernel {
    config: KernelConfig,
    /// Current kernel time
    now: Tick,
    /// Tick source used by `advance_ticks`
    clock: SimClock,
    processes: ProcessTable,
    privileges: PrivilegeMap,
    scheduler: Scheduler,
    timers: TimerQueue<TimerAction>,
    grants: GrantTables,
    /// Address space of every slot
    memory: Vec<AddressSpace>,
    trace: KernelTrace,
}

impl Kernel {
    /// Boots a kernel with the given configuration
    ///
    /// The CLOCK and SYSTEM kernel tasks occupy the first two slots.
    pub fn new(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::boot(config))
    }

    fn boot(config: KernelConfig) -> Self {
        let slots = config.max_processes;
        let mut kernel = Self {
            now: Tick::ZERO,
            clock: SimClock::new(),
            processes: ProcessTable::new(slots),
            privileges: PrivilegeMap::new(slots),
            scheduler: Scheduler::new(config.scheduler.queue_count),
            timers: TimerQueue::new(),
            grants: GrantTables::new(slots, config.grants.max_grants_per_process),
            memory: vec![AddressSpace::new(); slots],
            trace: KernelTrace::new(),
            config,
        };

        for (endpoint, name) in [(CLOCK, "clock"), (SYSTEM, "system")] {
            let process = kernel.new_process(endpoint, name, ProcessKind::KernelTask, Priority::HIGHEST);
            kernel.processes.install(process);
            kernel.privileges.set(endpoint, &Privileges::system());
        }
        log::info!(
            "kernel booted: {} slots, {} priority levels",
            slots,
            kernel.config.scheduler.queue_count
        );
        kernel
    }

    pub(crate) fn new_process(
        &self,
        endpoint: Endpoint,
        name: &str,
        kind: ProcessKind,
        priority: Priority,
    ) -> Process {
        Process::new(
            endpoint,
            name,
            kind,
            priority,
            Ticks(self.config.scheduler.quantum_ticks),
            self.config.max_processes,
            self.config.ipc.async_ring_capacity,
        )
    }

    /// Active configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Current kernel time
    pub fn now(&self) -> Tick {
        self.now
    }

    /// The process selected to run, if any
    pub fn current(&self) -> Option<Endpoint> {
        self.scheduler.current()
    }

    /// Looks up a live process
    pub fn process(&self, endpoint: Endpoint) -> Option<&Process> {
        self.processes.get(endpoint)
    }

    /// State of a process, including dead ones not yet cleared
    pub fn state_of(&self, endpoint: Endpoint) -> Option<RunState> {
        self.processes.get_any(endpoint).map(|p| p.state)
    }

    /// Iterates over live processes
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    /// Takes the completion of a blocking IPC call, once it has completed
    pub fn take_ipc_result(
        &mut self,
        endpoint: Endpoint,
    ) -> Option<Result<IpcCompletion, KernelError>> {
        self.processes.get_mut(endpoint)?.ipc_result.take()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn timers(&self) -> &TimerQueue<TimerAction> {
        &self.timers
    }

    pub fn trace(&self) -> &KernelTrace {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Privileges currently installed for `endpoint`
    pub fn privileges_of(&self, endpoint: Endpoint) -> Option<Privileges> {
        self.processes.get(endpoint)?;
        self.privileges.privileges_of(endpoint)
    }

    /// May `src` send to `dst`?
    pub fn may_send(&self, src: Endpoint, dst: Endpoint) -> bool {
        self.privileges.check_send(src, dst)
    }

    /// Reads a process's memory without grant checks
    ///
    /// This is the loader and test view of memory; processes themselves only
    /// move bytes through safe copy.
    pub fn read_memory(&self, endpoint: Endpoint, range: MemRange) -> Option<Vec<u8>> {
        self.processes.get(endpoint)?;
        self.space(endpoint).read(range).map(<[u8]>::to_vec)
    }

    /// Writes a process's memory without grant checks
    pub fn write_memory(&mut self, endpoint: Endpoint, range: MemRange, data: &[u8]) -> bool {
        if self.processes.get(endpoint).is_none() {
            return false;
        }
        self.memory[endpoint.slot().index()].write(range, data)
    }

    pub(crate) fn record(&mut self, event: trace::KernelEvent) {
        self.trace.record(self.now, event);
    }

    /// The caller must be a live, runnable user process
    pub(crate) fn check_caller(&self, caller: Endpoint) -> Result<(), KernelError> {
        match self.processes.get(caller) {
            Some(p) if !p.is_kernel_task() && p.state == RunState::Runnable => Ok(()),
            _ => Err(KernelError::InvalidCaller(caller)),
        }
    }

    /// Caller check plus the call mask
    pub(crate) fn require(&self, caller: Endpoint, call: KernelCallNumber) -> Result<(), KernelError> {
        self.check_caller(caller)?;
        if !self.privileges.permits_call(caller, call) {
            return Err(KernelError::NotAllowed(format!(
                "{} may not call {:?}",
                caller, call
            )));
        }
        Ok(())
    }

    pub(crate) fn priority_of(&self, endpoint: Endpoint) -> Priority {
        self.processes
            .get(endpoint)
            .map_or(Priority::HIGHEST, |p| p.priority)
    }

    /// Makes a blocked process runnable, or parks it in its pending hold
    pub(crate) fn wake(&mut self, endpoint: Endpoint) {
        let Some(process) = self.processes.get_mut(endpoint) else {
            return;
        };
        if let Some(hold) = process.pending_hold.take() {
            process.state = hold.state();
            return;
        }
        process.state = RunState::Runnable;
        let priority = process.priority;
        self.scheduler.enqueue(endpoint, priority);
    }

    /// Takes a process off the CPU and out of the ready queues
    pub(crate) fn deschedule(&mut self, endpoint: Endpoint) {
        if self.scheduler.current() == Some(endpoint) {
            self.save_quantum(endpoint);
        }
        self.scheduler.remove(endpoint, self.now);
    }

    /// Stops the quantum timer and keeps the unused ticks
    fn save_quantum(&mut self, endpoint: Endpoint) {
        let now = self.now;
        let Some(process) = self.processes.get_mut(endpoint) else {
            return;
        };
        if let Some(timer) = process.quantum_timer.take() {
            process.ticks_left = timer.deadline.ticks_since(now);
            self.timers.cancel(timer.handle);
        }
    }

    /// Runs `op`, then re-runs the scheduler whatever the outcome
    pub(crate) fn with_reschedule<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, KernelError>,
    ) -> Result<T, KernelError> {
        let result = op(self);
        self.run_scheduler();
        result
    }

    /// Preempts the running process if something more urgent is ready, and
    /// dispatches when the CPU is free
    pub(crate) fn run_scheduler(&mut self) {
        if let Some(current) = self.scheduler.current() {
            let priority = self.priority_of(current);
            match self.scheduler.highest_ready_level() {
                Some(level) if level < priority.level() => {
                    self.save_quantum(current);
                    self.scheduler.preempt_current(
                        priority,
                        PreemptionReason::HigherPriority,
                        self.now,
                    );
                }
                _ => return,
            }
        }

        let processes = &self.processes;
        let next = self.scheduler.select_next(
            |ep| processes.get(ep).map_or(Priority::HIGHEST, |p| p.priority),
            self.now,
        );
        match next {
            Some(endpoint) => self.arm_quantum(endpoint),
            None => {
                // Idle: give queued async messages a chance to land
                if self.drain_all_rings() {
                    self.run_scheduler();
                }
            }
        }
    }

    fn arm_quantum(&mut self, endpoint: Endpoint) {
        let now = self.now;
        let Some(process) = self.processes.get_mut(endpoint) else {
            return;
        };
        if process.ticks_left.is_zero() {
            process.ticks_left = process.quantum;
        }
        let deadline = now + process.ticks_left;
        let handle = self
            .timers
            .arm(deadline, TimerAction::QuantumExpired(endpoint));
        process.quantum_timer = Some(QuantumTimer { handle, deadline });
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::boot(KernelConfig::default())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("now", &self.now)
            .field("current", &self.scheduler.current())
            .field("processes", &self.processes.endpoints())
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}
