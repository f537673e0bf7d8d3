//! [`KernelApi`] for the kernel state machine
//!
//! Each call runs its operation and then the scheduler, success or not.

use crate::Kernel;
use core_types::{AccessMode, Endpoint, GrantId, MemRange, MemoryPerms, Priority, RegionId};
use ipc::{Message, SourceFilter};
use kernel_api::{
    GrantRef, IpcOutcome, KernelApi, KernelError, Privileges, SafeCopyRequest, Tick, Ticks,
    TimerHandle,
};

impl KernelApi for Kernel {
    fn send(&mut self, caller: Endpoint, dst: Endpoint, msg: Message) -> Result<IpcOutcome, KernelError> {
        self.with_reschedule(|k| k.do_send(caller, dst, msg))
    }

    fn receive(&mut self, caller: Endpoint, from: SourceFilter) -> Result<IpcOutcome, KernelError> {
        self.with_reschedule(|k| k.do_receive(caller, from))
    }

    fn sendrec(&mut self, caller: Endpoint, dst: Endpoint, msg: Message) -> Result<IpcOutcome, KernelError> {
        self.with_reschedule(|k| k.do_sendrec(caller, dst, msg))
    }

    fn notify(&mut self, caller: Endpoint, dst: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_notify(caller, dst))
    }

    fn send_async(&mut self, caller: Endpoint, dst: Endpoint, msg: Message) -> Result<IpcOutcome, KernelError> {
        self.with_reschedule(|k| k.do_send_async(caller, dst, msg))
    }

    fn create_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        range: MemRange,
        access: AccessMode,
        single_use: bool,
    ) -> Result<GrantId, KernelError> {
        self.with_reschedule(|k| k.do_create_grant(caller, grantee, range, access, single_use))
    }

    fn create_indirect_grant(
        &mut self,
        caller: Endpoint,
        grantee: Endpoint,
        source: GrantRef,
        offset: u64,
        len: u64,
        access: AccessMode,
    ) -> Result<GrantId, KernelError> {
        self.with_reschedule(|k| {
            k.do_create_indirect_grant(caller, grantee, source, offset, len, access)
        })
    }

    fn safe_copy(&mut self, caller: Endpoint, request: SafeCopyRequest) -> Result<u64, KernelError> {
        self.with_reschedule(|k| k.do_safe_copy(caller, request))
    }

    fn safe_copy_vec(
        &mut self,
        caller: Endpoint,
        requests: &[SafeCopyRequest],
    ) -> Result<u64, KernelError> {
        self.with_reschedule(|k| k.do_safe_copy_vec(caller, requests))
    }

    fn revoke_grant(&mut self, caller: Endpoint, grant: GrantId) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_revoke_grant(caller, grant))
    }

    fn arm_timer(&mut self, caller: Endpoint, deadline: Tick, arg: u64) -> Result<TimerHandle, KernelError> {
        self.with_reschedule(|k| k.do_arm_timer(caller, deadline, arg))
    }

    fn cancel_timer(&mut self, caller: Endpoint, handle: TimerHandle) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_cancel_timer(caller, handle))
    }

    fn set_privileges(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        privileges: Privileges,
    ) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_set_privileges(caller, target, privileges))
    }

    fn spawn(
        &mut self,
        caller: Endpoint,
        name: &str,
        priority: Priority,
        privileges: Privileges,
    ) -> Result<Endpoint, KernelError> {
        self.with_reschedule(|k| k.do_spawn(caller, name, priority, privileges))
    }

    fn kill(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_kill(caller, target))
    }

    fn exit(&mut self, caller: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_exit(caller))
    }

    fn clear(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_clear(caller, target))
    }

    fn stop(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_stop(caller, target))
    }

    fn resume(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_resume(caller, target))
    }

    fn block_on_signal(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_block_on_signal(caller, target))
    }

    fn end_signal(&mut self, caller: Endpoint, target: Endpoint) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_end_signal(caller, target))
    }

    fn reschedule(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        priority: Priority,
        quantum: Ticks,
    ) -> Result<(), KernelError> {
        self.with_reschedule(|k| k.do_reschedule(caller, target, priority, quantum))
    }

    fn map_region(
        &mut self,
        caller: Endpoint,
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<RegionId, KernelError> {
        self.with_reschedule(|k| k.do_map_region(caller, target, size, perms))
    }

    fn uptime(&self) -> Tick {
        self.now
    }
}
