//! Kernel API trait and kernel-call argument types

use crate::{KernelError, Privileges, Tick, Ticks, TimerHandle};
use core_types::{
    AccessMode, CopyDirection, Endpoint, GrantId, MemRange, MemoryPerms, Priority, RegionId,
};
use ipc::{Message, SourceFilter};
use serde::{Deserialize, Serialize};

/// Immediate outcome of an IPC trap
///
/// A blocked caller learns how its call finished later, when it is runnable
/// again (see [`IpcCompletion`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcOutcome {
    /// The message reached its destination without blocking
    Delivered,
    /// A message was available and is returned to the caller
    Received(Message),
    /// The caller is now blocked in send or receive
    Blocked,
    /// An asynchronous message was placed in the caller's ring
    Queued,
}

/// How a blocked IPC call eventually completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcCompletion {
    /// A blocked send was taken by its receiver
    Sent,
    /// A blocked receive (or the reply half of a sendrec) got a message
    Received(Message),
}

/// Names one grant in one owner's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantRef {
    pub owner: Endpoint,
    pub grant: GrantId,
}

impl GrantRef {
    pub fn new(owner: Endpoint, grant: GrantId) -> Self {
        Self { owner, grant }
    }
}

/// Arguments of one safe copy
///
/// `offset` is relative to the start of the granted range. `local` is a
/// range in the caller's own address space; its length is the number of
/// bytes requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeCopyRequest {
    pub source: GrantRef,
    pub offset: u64,
    pub direction: CopyDirection,
    pub local: MemRange,
}

/// The kernel API trait
///
/// This is the whole surface of the kernel core. Every call names the
/// process making it; implementations reject callers that are not live and
/// runnable.
///
/// # Design Principles
///
/// **Rendezvous**: Synchronous messages are copied directly from sender to
/// receiver. Nothing is buffered in the kernel except asynchronous rings.
///
/// **Explicit authority**: Who may send to whom is a per-process privilege,
/// and cross-process memory access needs a grant.
///
/// **Explicit time**: Deadlines are absolute ticks.
///
/// # Example
///
/// ```
/// use kernel_api::{IpcOutcome, KernelApi, KernelError};
/// use core_types::Endpoint;
/// use ipc::Message;
///
/// fn ping<K: KernelApi>(kernel: &mut K, me: Endpoint, peer: Endpoint) -> Result<bool, KernelError> {
///     let outcome = kernel.send(me, peer, Message::new(1))?;
///     Ok(outcome == IpcOutcome::Delivered)
/// }
/// ```
pub trait KernelApi {
    /// Sends `msg` to `dst`, blocking until it is received
    ///
    /// # Errors
    ///
    /// * `NoSuchTarget` if `dst` is not a live process of matching generation
    /// * `NotAllowed` if the privilege map forbids the pair
    /// * `Deadlock` if blocking would close a wait cycle
    fn send(&mut self, caller: Endpoint, dst: Endpoint, msg: Message)
        -> Result<IpcOutcome, KernelError>;

    /// Receives from a sender matching `from`, blocking if none is waiting
    fn receive(&mut self, caller: Endpoint, from: SourceFilter)
        -> Result<IpcOutcome, KernelError>;

    /// Sends `msg` to `dst` and then receives the reply from `dst`
    ///
    /// Both halves form one atomic call from the caller's point of view.
    /// Nothing else is delivered to the caller in between.
    fn sendrec(&mut self, caller: Endpoint, dst: Endpoint, msg: Message)
        -> Result<IpcOutcome, KernelError>;

    /// Posts a content-less notification to `dst`; never blocks
    fn notify(&mut self, caller: Endpoint, dst: Endpoint) -> Result<(), KernelError>;

    /// Sends `msg` asynchronously; never blocks
    ///
    /// # Errors
    ///
    /// `QueueFull` when the caller's async ring has no room.
    fn send_async(&mut self, caller: Endpoint, dst: Endpoint, msg: Message)
        -> Result<IpcOutcome, KernelError>;

    /// Grants `grantee` access to `range` of the caller's memory
    ///
    /// `grantee` may be `Endpoint::ANY`.
    fn create_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        range: MemRange,
        access: AccessMode,
        single_use: bool,
    ) -> Result<GrantId, KernelError>;

    /// Forwards part of a grant the caller holds to a third process
    fn create_indirect_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        source: GrantRef,
        offset: u64,
        len: u64,
        access: AccessMode,
    ) -> Result<GrantId, KernelError>;

    /// Copies through a grant; returns the number of bytes copied
    ///
    /// The length is clamped to what the grant covers.
    fn safe_copy(&mut self, caller: Endpoint, request: SafeCopyRequest)
        -> Result<u64, KernelError>;

    /// Performs several safe copies, or none if any one is invalid
    fn safe_copy_vec(
        &mut self,
        caller: Endpoint,
        requests: &[SafeCopyRequest],
    ) -> Result<u64, KernelError>;

    /// Revokes one of the caller's grants; idempotent
    fn revoke_grant(&mut self, caller: Endpoint, grant: GrantId) -> Result<(), KernelError>;

    /// Arms an alarm delivered to the caller as a CLOCK notification
    fn arm_timer(&mut self, caller: Endpoint, deadline: Tick, arg: u64)
        -> Result<TimerHandle, KernelError>;

    /// Cancels an alarm; idempotent
    fn cancel_timer(&mut self, caller: Endpoint, handle: TimerHandle) -> Result<(), KernelError>;

    /// Replaces the privileges of `target` (system only)
    fn set_privileges(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        privileges: Privileges,
    ) -> Result<(), KernelError>;

    /// Creates a process in a fresh slot (system only)
    fn spawn(
        &mut self,
        caller: Endpoint,
        name: &str,
        priority: Priority,
        privileges: Privileges,
    ) -> Result<Endpoint, KernelError>;

    /// Terminates `target` (system only)
    fn kill(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Terminates the caller
    fn exit(&mut self, caller: Endpoint) -> Result<(), KernelError>;

    /// Reclaims the slot of a dead process (system only)
    fn clear(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Takes a runnable process off the CPU (system only)
    fn stop(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Undoes [`KernelApi::stop`] (system only)
    fn resume(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Holds a process while a signal is handled (system only)
    fn block_on_signal(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Releases a signal hold (system only)
    fn end_signal(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError>;

    /// Changes priority and quantum of `target` (system only)
    fn reschedule(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        priority: Priority,
        quantum: Ticks,
    ) -> Result<(), KernelError>;

    /// Adds a memory region to `target` (system only)
    fn map_region(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<RegionId, KernelError>;

    /// Returns the current tick
    fn uptime(&self) -> Tick;
}
