//! Kernel-call gate.
//!
//! The gate is the trap entry: it takes a numbered [`KernelCall`] on behalf of
//! a process, dispatches it to a [`KernelApi`] implementation and audits the
//! outcome. The per-process call mask is enforced by the kernel itself, so a
//! call that slips past the gate is still checked.

use core_types::Endpoint;
use kernel_api::{
    KernelApi, KernelCall, KernelCallNumber, KernelCallReply, KernelError, Tick,
};
use serde::{Deserialize, Serialize};

/// Kernel-call audit event (for testing and verification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallEvent {
    /// Call was invoked
    Invoked {
        caller: Endpoint,
        call: KernelCallNumber,
        timestamp: Tick,
    },
    /// Call completed successfully
    Completed {
        caller: Endpoint,
        call: KernelCallNumber,
        timestamp: Tick,
    },
    /// Call was rejected
    Rejected {
        caller: Endpoint,
        call: KernelCallNumber,
        error: KernelError,
        timestamp: Tick,
    },
    /// Trap carried a number that names no call, or not this call
    BadNumber {
        caller: Endpoint,
        number: u8,
        timestamp: Tick,
    },
}

/// Audit log for kernel calls.
#[derive(Debug, Clone, Default)]
pub struct SyscallAuditLog {
    events: Vec<SyscallEvent>,
}

impl SyscallAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: SyscallEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SyscallEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Trap entry for kernel calls.
#[derive(Debug, Default)]
pub struct SyscallGate {
    /// Audit log for kernel calls
    audit_log: SyscallAuditLog,
}

impl SyscallGate {
    pub fn new() -> Self {
        Self {
            audit_log: SyscallAuditLog::new(),
        }
    }

    /// Returns the audit log (test-only)
    pub fn audit_log(&self) -> &SyscallAuditLog {
        &self.audit_log
    }

    /// Clears the audit log (test-only)
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    /// Executes a trap that carries its call number separately
    ///
    /// The number must name a call and agree with the decoded arguments.
    pub fn execute_numbered(
        &mut self,
        kernel: &mut dyn KernelApi,
        caller: Endpoint,
        number: u8,
        call: KernelCall,
    ) -> Result<KernelCallReply, KernelError> {
        if KernelCallNumber::from_number(number) != Some(call.number()) {
            self.audit_log.record(SyscallEvent::BadNumber {
                caller,
                number,
                timestamp: kernel.uptime(),
            });
            return Err(KernelError::InvalidArgument(format!(
                "bad kernel call number {}",
                number
            )));
        }
        self.execute(kernel, caller, call)
    }

    /// Executes a kernel call on behalf of `caller`.
    pub fn execute(
        &mut self,
        kernel: &mut dyn KernelApi,
        caller: Endpoint,
        call: KernelCall,
    ) -> Result<KernelCallReply, KernelError> {
        let number = call.number();
        self.audit_log.record(SyscallEvent::Invoked {
            caller,
            call: number,
            timestamp: kernel.uptime(),
        });

        let result = Self::dispatch(kernel, caller, call);

        let timestamp = kernel.uptime();
        match &result {
            Ok(_) => {
                self.audit_log.record(SyscallEvent::Completed {
                    caller,
                    call: number,
                    timestamp,
                });
            }
            Err(error) => {
                log::debug!("{:?} from {} rejected: {}", number, caller, error);
                self.audit_log.record(SyscallEvent::Rejected {
                    caller,
                    call: number,
                    error: error.clone(),
                    timestamp,
                });
            }
        }

        result
    }

    fn dispatch(
        kernel: &mut dyn KernelApi,
        caller: Endpoint,
        call: KernelCall,
    ) -> Result<KernelCallReply, KernelError> {
        use KernelCallReply as Reply;

        match call {
            KernelCall::Send { dst, msg } => kernel.send(caller, dst, msg).map(Reply::Ipc),
            KernelCall::Receive { from } => kernel.receive(caller, from).map(Reply::Ipc),
            KernelCall::SendRec { dst, msg } => kernel.sendrec(caller, dst, msg).map(Reply::Ipc),
            KernelCall::Notify { dst } => kernel.notify(caller, dst).map(|_| Reply::Done),
            KernelCall::SendAsync { dst, msg } => {
                kernel.send_async(caller, dst, msg).map(Reply::Ipc)
            }
            KernelCall::CreateGrant {
                grantee,
                range,
                access,
                single_use,
            } => kernel
                .create_grant(caller, grantee, range, access, single_use)
                .map(Reply::Grant),
            KernelCall::CreateIndirectGrant {
                grantee,
                source,
                offset,
                len,
                access,
            } => kernel
                .create_indirect_grant(caller, grantee, source, offset, len, access)
                .map(Reply::Grant),
            KernelCall::SafeCopy(request) => kernel.safe_copy(caller, request).map(Reply::Copied),
            KernelCall::SafeCopyVec(requests) => {
                kernel.safe_copy_vec(caller, &requests).map(Reply::Copied)
            }
            KernelCall::RevokeGrant { grant } => {
                kernel.revoke_grant(caller, grant).map(|_| Reply::Done)
            }
            KernelCall::ArmTimer { deadline, arg } => {
                kernel.arm_timer(caller, deadline, arg).map(Reply::Timer)
            }
            KernelCall::CancelTimer { handle } => {
                kernel.cancel_timer(caller, handle).map(|_| Reply::Done)
            }
            KernelCall::SetPrivileges { target, privileges } => kernel
                .set_privileges(caller, target, privileges)
                .map(|_| Reply::Done),
            KernelCall::Spawn {
                name,
                priority,
                privileges,
            } => kernel
                .spawn(caller, &name, priority, privileges)
                .map(Reply::Spawned),
            KernelCall::Kill { target } => kernel.kill(caller, target).map(|_| Reply::Done),
            KernelCall::Exit => kernel.exit(caller).map(|_| Reply::Done),
            KernelCall::Clear { target } => kernel.clear(caller, target).map(|_| Reply::Done),
            KernelCall::Stop { target } => kernel.stop(caller, target).map(|_| Reply::Done),
            KernelCall::Resume { target } => kernel.resume(caller, target).map(|_| Reply::Done),
            KernelCall::BlockOnSignal { target } => {
                kernel.block_on_signal(caller, target).map(|_| Reply::Done)
            }
            KernelCall::EndSignal { target } => {
                kernel.end_signal(caller, target).map(|_| Reply::Done)
            }
            KernelCall::Reschedule {
                target,
                priority,
                quantum,
            } => kernel
                .reschedule(caller, target, priority, quantum)
                .map(|_| Reply::Done),
            KernelCall::MapRegion {
                target,
                size,
                perms,
            } => kernel
                .map_region(caller, target, size, perms)
                .map(Reply::Region),
            KernelCall::Uptime => Ok(Reply::Uptime(kernel.uptime())),
        }
    }
}
