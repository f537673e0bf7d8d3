//! Process descriptors and the process table
//!
//! The table is an arena of slots. Each slot carries a generation that moves
//! on when the slot is reclaimed, so an [`Endpoint`] captured before the
//! reuse stops resolving.

use crate::async_ring::AsyncRing;
use core_types::{Endpoint, Priority, ProcessSlot};
use ipc::{Message, NotifyBitmap, SourceFilter};
use kernel_api::{IpcCompletion, KernelError, Ticks, TimerHandle};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Run state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Ready to run, or running
    Runnable,
    /// Blocked until `to` receives its message
    Sending { to: Endpoint },
    /// Blocked until a sender matching `from` arrives
    Receiving { from: SourceFilter },
    /// Held while a signal is being handled
    BlockedOnSignal,
    /// Taken off the CPU by a system process
    Stopped,
    /// Terminated; the slot still needs to be cleared
    Dead,
}

impl RunState {
    /// True for the two IPC-blocked states
    pub fn is_ipc_blocked(&self) -> bool {
        matches!(self, RunState::Sending { .. } | RunState::Receiving { .. })
    }
}

/// Kernel tasks live inside the kernel and are never scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessKind {
    KernelTask,
    User,
}

/// A state change requested while the process was blocked in IPC
///
/// The hold is applied when the process would next become runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hold {
    Stop,
    Signal,
}

impl Hold {
    /// State the process enters when the hold is applied
    pub fn state(&self) -> RunState {
        match self {
            Hold::Stop => RunState::Stopped,
            Hold::Signal => RunState::BlockedOnSignal,
        }
    }
}

/// Saved register file
///
/// The kernel core never interprets it; trap glue fills and restores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedContext {
    pub registers: [u64; 16],
}

/// Quantum timer of the running process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumTimer {
    pub handle: TimerHandle,
    pub deadline: kernel_api::Tick,
}

/// Process descriptor
#[derive(Debug, Clone)]
pub struct Process {
    pub endpoint: Endpoint,
    pub name: String,
    pub kind: ProcessKind,
    pub state: RunState,
    pub priority: Priority,
    /// Full quantum length
    pub quantum: Ticks,
    /// Unused part of the current quantum
    pub ticks_left: Ticks,
    pub context: SavedContext,
    pub parent: Option<Endpoint>,

    /// Processes blocked sending to this one, in arrival order
    pub senders: VecDeque<Endpoint>,
    /// Message held while this process is blocked sending
    pub send_buffer: Option<Message>,
    /// Outcome of the last blocking IPC call, once it completed
    pub ipc_result: Option<Result<IpcCompletion, KernelError>>,
    /// Partner of an in-flight sendrec
    pub sendrec_target: Option<Endpoint>,

    /// Pending notifications, one bit per source slot
    pub notify_pending: NotifyBitmap,
    /// Argument of the most recent alarm, carried by the CLOCK notification
    pub alarm_arg: Option<u64>,
    /// Undelivered messages this process sent asynchronously
    pub async_ring: AsyncRing,
    /// Processes holding async messages for this one, oldest first
    pub async_pending: VecDeque<Endpoint>,

    pub pending_hold: Option<Hold>,
    pub quantum_timer: Option<QuantumTimer>,
    /// Alarms armed by this process
    pub alarms: Vec<TimerHandle>,
}

impl Process {
    pub(crate) fn new(
        endpoint: Endpoint,
        name: &str,
        kind: ProcessKind,
        priority: Priority,
        quantum: Ticks,
        slots: usize,
        ring_capacity: usize,
    ) -> Self {
        Self {
            endpoint,
            name: name.to_string(),
            kind,
            state: RunState::Runnable,
            priority,
            quantum,
            ticks_left: quantum,
            context: SavedContext::default(),
            parent: None,
            senders: VecDeque::new(),
            send_buffer: None,
            ipc_result: None,
            sendrec_target: None,
            notify_pending: NotifyBitmap::with_capacity(slots),
            alarm_arg: None,
            async_ring: AsyncRing::with_capacity(ring_capacity),
            async_pending: VecDeque::new(),
            pending_hold: None,
            quantum_timer: None,
            alarms: Vec::new(),
        }
    }

    /// True for live kernel tasks
    pub fn is_kernel_task(&self) -> bool {
        self.kind == ProcessKind::KernelTask
    }

    /// True while waiting for the reply half of a sendrec
    pub fn awaiting_reply(&self) -> bool {
        self.sendrec_target.is_some()
    }

    /// Checks whether a synchronous message from `src` can be taken now
    pub fn accepts(&self, src: Endpoint) -> bool {
        matches!(self.state, RunState::Receiving { from } if from.matches(src))
    }

    /// Checks whether a notification or async message from `src` can be taken now
    pub fn accepts_unsolicited(&self, src: Endpoint) -> bool {
        self.accepts(src) && !self.awaiting_reply()
    }

    /// Endpoint this process is waiting on, if any
    pub fn waits_on(&self) -> Option<Endpoint> {
        match self.state {
            RunState::Sending { to } => Some(to),
            RunState::Receiving {
                from: SourceFilter::From(ep),
            } => Some(ep),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    process: Option<Process>,
}

/// Arena of process descriptors
#[derive(Debug)]
pub struct ProcessTable {
    slots: Vec<Slot>,
}

impl ProcessTable {
    /// Creates an empty table with `max_processes` slots
    pub fn new(max_processes: usize) -> Self {
        let slots = (0..max_processes)
            .map(|_| Slot {
                generation: 0,
                process: None,
            })
            .collect();
        Self { slots }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Places a process in the first free slot at or after `first`
    ///
    /// The closure receives the endpoint the process will have.
    pub fn allocate<F>(&mut self, first: ProcessSlot, build: F) -> Result<Endpoint, KernelError>
    where
        F: FnOnce(Endpoint) -> Process,
    {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(first.index())
            .find(|(_, slot)| slot.process.is_none())
            .ok_or_else(|| KernelError::ResourceExhausted("process table full".to_string()))?;

        let endpoint = Endpoint::new(ProcessSlot(index as u32), slot.generation);
        slot.process = Some(build(endpoint));
        Ok(endpoint)
    }

    /// Places a process in the slot its endpoint names
    ///
    /// # Panics
    ///
    /// Panics if the slot is occupied or has moved to another generation.
    pub fn install(&mut self, process: Process) {
        let endpoint = process.endpoint;
        let slot = &mut self.slots[endpoint.slot().index()];
        assert!(
            slot.process.is_none() && slot.generation == endpoint.generation(),
            "slot of {} is taken",
            endpoint
        );
        slot.process = Some(process);
    }

    /// Looks up a live process; stale generations and dead processes fail
    pub fn get(&self, endpoint: Endpoint) -> Option<&Process> {
        self.get_any(endpoint)
            .filter(|p| p.state != RunState::Dead)
    }

    /// Mutable form of [`ProcessTable::get`]
    pub fn get_mut(&mut self, endpoint: Endpoint) -> Option<&mut Process> {
        self.get_any_mut(endpoint)
            .filter(|p| p.state != RunState::Dead)
    }

    /// Looks up a process of matching generation, dead or alive
    pub fn get_any(&self, endpoint: Endpoint) -> Option<&Process> {
        if endpoint.is_reserved() {
            return None;
        }
        self.slots
            .get(endpoint.slot().index())
            .filter(|slot| slot.generation == endpoint.generation())
            .and_then(|slot| slot.process.as_ref())
    }

    fn get_any_mut(&mut self, endpoint: Endpoint) -> Option<&mut Process> {
        if endpoint.is_reserved() {
            return None;
        }
        self.slots
            .get_mut(endpoint.slot().index())
            .filter(|slot| slot.generation == endpoint.generation())
            .and_then(|slot| slot.process.as_mut())
    }

    /// Resolves a live process or fails with `NoSuchTarget`
    pub fn live(&self, endpoint: Endpoint) -> Result<&Process, KernelError> {
        self.get(endpoint).ok_or(KernelError::NoSuchTarget(endpoint))
    }

    /// Mutable form of [`ProcessTable::live`]
    pub fn live_mut(&mut self, endpoint: Endpoint) -> Result<&mut Process, KernelError> {
        self.get_mut(endpoint)
            .ok_or(KernelError::NoSuchTarget(endpoint))
    }

    /// Endpoint of the live process in `slot`
    pub fn endpoint_at(&self, slot: ProcessSlot) -> Option<Endpoint> {
        self.slots
            .get(slot.index())
            .and_then(|s| s.process.as_ref())
            .filter(|p| p.state != RunState::Dead)
            .map(|p| p.endpoint)
    }

    /// Current generation of `slot`
    pub fn generation_of(&self, slot: ProcessSlot) -> Option<u32> {
        self.slots.get(slot.index()).map(|s| s.generation)
    }

    /// Empties a dead process's slot and moves its generation on
    ///
    /// # Panics
    ///
    /// Panics if the process is not dead.
    pub fn reclaim(&mut self, endpoint: Endpoint) {
        let slot = &mut self.slots[endpoint.slot().index()];
        let state = slot.process.as_ref().map(|p| p.state);
        assert_eq!(
            state,
            Some(RunState::Dead),
            "reclaiming {} which is not dead",
            endpoint
        );
        slot.process = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Live processes in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots
            .iter()
            .filter_map(|s| s.process.as_ref())
            .filter(|p| p.state != RunState::Dead)
    }

    /// Mutable form of [`ProcessTable::iter`]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.slots
            .iter_mut()
            .filter_map(|s| s.process.as_mut())
            .filter(|p| p.state != RunState::Dead)
    }

    /// Endpoints of all live processes
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.iter().map(|p| p.endpoint).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(ep: Endpoint) -> Process {
        Process::new(ep, "p", ProcessKind::User, Priority(8), Ticks(4), 8, 4)
    }

    #[test]
    fn test_allocate_skips_reserved_slots() {
        let mut table = ProcessTable::new(4);
        let ep = table.allocate(ProcessSlot(2), user).unwrap();
        assert_eq!(ep, Endpoint::new(ProcessSlot(2), 0));
        let ep = table.allocate(ProcessSlot(2), user).unwrap();
        assert_eq!(ep.slot(), ProcessSlot(3));
        assert!(matches!(
            table.allocate(ProcessSlot(2), user),
            Err(KernelError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_dead_process_does_not_resolve() {
        let mut table = ProcessTable::new(4);
        let ep = table.allocate(ProcessSlot(0), user).unwrap();
        table.get_mut(ep).unwrap().state = RunState::Dead;

        assert!(table.get(ep).is_none());
        assert!(table.get_any(ep).is_some());
        assert_eq!(table.live(ep).unwrap_err(), KernelError::NoSuchTarget(ep));
        assert_eq!(table.endpoint_at(ep.slot()), None);
    }

    #[test]
    fn test_reclaim_bumps_generation() {
        let mut table = ProcessTable::new(2);
        let old = table.allocate(ProcessSlot(0), user).unwrap();
        table.get_mut(old).unwrap().state = RunState::Dead;
        table.reclaim(old);

        let new = table.allocate(ProcessSlot(0), user).unwrap();
        assert_eq!(new.slot(), old.slot());
        assert_eq!(new.generation(), old.generation() + 1);
        assert!(table.get(old).is_none());
        assert!(table.get(new).is_some());
    }

    #[test]
    #[should_panic(expected = "not dead")]
    fn test_reclaim_live_process_panics() {
        let mut table = ProcessTable::new(2);
        let ep = table.allocate(ProcessSlot(0), user).unwrap();
        table.reclaim(ep);
    }

    #[test]
    fn test_reserved_endpoints_never_resolve() {
        let mut table = ProcessTable::new(2);
        table.allocate(ProcessSlot(0), user).unwrap();
        assert!(table.get(Endpoint::ANY).is_none());
        assert!(table.get(Endpoint::NONE).is_none());
    }

    #[test]
    fn test_accepts_respects_filter_and_reply_wait() {
        let mut table = ProcessTable::new(4);
        let a = table.allocate(ProcessSlot(0), user).unwrap();
        let b = table.allocate(ProcessSlot(0), user).unwrap();
        let c = table.allocate(ProcessSlot(0), user).unwrap();

        let pa = table.get_mut(a).unwrap();
        pa.state = RunState::Receiving {
            from: SourceFilter::From(b),
        };
        assert!(pa.accepts(b));
        assert!(!pa.accepts(c));
        assert_eq!(pa.waits_on(), Some(b));

        pa.sendrec_target = Some(b);
        assert!(pa.accepts(b));
        assert!(!pa.accepts_unsolicited(b));
    }
}
