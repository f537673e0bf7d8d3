//! Numbered kernel-call boundary
//!
//! Every kernel call has a fixed number. A process may only invoke calls
//! whose bit is set in its [`CallMask`]. [`KernelCall`] is the typed,
//! serializable form of one trap, and [`KernelCallReply`] its result.

use crate::kernel::{GrantRef, IpcOutcome, SafeCopyRequest};
use crate::privileges::Privileges;
use crate::time::{Tick, Ticks, TimerHandle};
use bitflags::bitflags;
use core_types::{AccessMode, Endpoint, GrantId, MemRange, MemoryPerms, Priority, RegionId};
use ipc::{Message, SourceFilter};
use serde::{Deserialize, Serialize};

/// Fixed kernel-call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KernelCallNumber {
    Send = 0,
    Receive = 1,
    SendRec = 2,
    Notify = 3,
    SendAsync = 4,
    CreateGrant = 5,
    CreateIndirectGrant = 6,
    SafeCopy = 7,
    SafeCopyVec = 8,
    RevokeGrant = 9,
    ArmTimer = 10,
    CancelTimer = 11,
    SetPrivileges = 12,
    Spawn = 13,
    Kill = 14,
    Exit = 15,
    Clear = 16,
    Stop = 17,
    Resume = 18,
    BlockOnSignal = 19,
    EndSignal = 20,
    Reschedule = 21,
    MapRegion = 22,
    Uptime = 23,
}

impl KernelCallNumber {
    /// Every call number, in numeric order
    pub const ALL: [KernelCallNumber; 24] = [
        KernelCallNumber::Send,
        KernelCallNumber::Receive,
        KernelCallNumber::SendRec,
        KernelCallNumber::Notify,
        KernelCallNumber::SendAsync,
        KernelCallNumber::CreateGrant,
        KernelCallNumber::CreateIndirectGrant,
        KernelCallNumber::SafeCopy,
        KernelCallNumber::SafeCopyVec,
        KernelCallNumber::RevokeGrant,
        KernelCallNumber::ArmTimer,
        KernelCallNumber::CancelTimer,
        KernelCallNumber::SetPrivileges,
        KernelCallNumber::Spawn,
        KernelCallNumber::Kill,
        KernelCallNumber::Exit,
        KernelCallNumber::Clear,
        KernelCallNumber::Stop,
        KernelCallNumber::Resume,
        KernelCallNumber::BlockOnSignal,
        KernelCallNumber::EndSignal,
        KernelCallNumber::Reschedule,
        KernelCallNumber::MapRegion,
        KernelCallNumber::Uptime,
    ];

    /// Returns the raw call number
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Looks up a call by its raw number
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    /// Is this call reserved for system processes?
    pub fn is_system_only(&self) -> bool {
        CallMask::system_only().contains(self.mask_bit())
    }

    /// The mask bit guarding this call
    pub fn mask_bit(&self) -> CallMask {
        CallMask::from_bits_retain(1u32 << self.number())
    }
}

bitflags! {
    /// Set of kernel calls a process may invoke.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CallMask: u32 {
        const SEND = 1 << 0;
        const RECEIVE = 1 << 1;
        const SENDREC = 1 << 2;
        const NOTIFY = 1 << 3;
        const SEND_ASYNC = 1 << 4;
        const CREATE_GRANT = 1 << 5;
        const CREATE_INDIRECT_GRANT = 1 << 6;
        const SAFECOPY = 1 << 7;
        const SAFECOPY_VEC = 1 << 8;
        const REVOKE_GRANT = 1 << 9;
        const ARM_TIMER = 1 << 10;
        const CANCEL_TIMER = 1 << 11;
        const SET_PRIVILEGES = 1 << 12;
        const SPAWN = 1 << 13;
        const KILL = 1 << 14;
        const EXIT = 1 << 15;
        const CLEAR = 1 << 16;
        const STOP = 1 << 17;
        const RESUME = 1 << 18;
        const BLOCK_ON_SIGNAL = 1 << 19;
        const END_SIGNAL = 1 << 20;
        const RESCHEDULE = 1 << 21;
        const MAP_REGION = 1 << 22;
        const UPTIME = 1 << 23;

        /// Message-passing traps
        const IPC = Self::SEND.bits()
            | Self::RECEIVE.bits()
            | Self::SENDREC.bits()
            | Self::NOTIFY.bits()
            | Self::SEND_ASYNC.bits();
    }
}

impl CallMask {
    /// Calls available to an ordinary user process
    pub fn user_default() -> Self {
        CallMask::IPC
            | CallMask::CREATE_GRANT
            | CallMask::CREATE_INDIRECT_GRANT
            | CallMask::REVOKE_GRANT
            | CallMask::ARM_TIMER
            | CallMask::CANCEL_TIMER
            | CallMask::EXIT
            | CallMask::UPTIME
    }

    /// Calls available to a system process
    pub fn system() -> Self {
        CallMask::all()
    }

    /// Calls that need the system flag whatever the mask says
    pub fn system_only() -> Self {
        CallMask::SET_PRIVILEGES
            | CallMask::SPAWN
            | CallMask::KILL
            | CallMask::CLEAR
            | CallMask::STOP
            | CallMask::RESUME
            | CallMask::BLOCK_ON_SIGNAL
            | CallMask::END_SIGNAL
            | CallMask::RESCHEDULE
            | CallMask::MAP_REGION
    }

    /// Checks whether `call` is permitted
    pub fn permits(&self, call: KernelCallNumber) -> bool {
        self.contains(call.mask_bit())
    }
}

/// One kernel call with its arguments
///
/// The caller is not part of the call; the kernel knows who trapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelCall {
    Send {
        dst: Endpoint,
        msg: Message,
    },
    Receive {
        from: SourceFilter,
    },
    SendRec {
        dst: Endpoint,
        msg: Message,
    },
    Notify {
        dst: Endpoint,
    },
    SendAsync {
        dst: Endpoint,
        msg: Message,
    },
    CreateGrant {
        grantee: Endpoint,
        range: MemRange,
        access: AccessMode,
        single_use: bool,
    },
    CreateIndirectGrant {
        grantee: Endpoint,
        source: GrantRef,
        offset: u64,
        len: u64,
        access: AccessMode,
    },
    SafeCopy(SafeCopyRequest),
    SafeCopyVec(Vec<SafeCopyRequest>),
    RevokeGrant {
        grant: GrantId,
    },
    ArmTimer {
        deadline: Tick,
        arg: u64,
    },
    CancelTimer {
        handle: TimerHandle,
    },
    SetPrivileges {
        target: Endpoint,
        privileges: Privileges,
    },
    Spawn {
        name: String,
        priority: Priority,
        privileges: Privileges,
    },
    Kill {
        target: Endpoint,
    },
    Exit,
    Clear {
        target: Endpoint,
    },
    Stop {
        target: Endpoint,
    },
    Resume {
        target: Endpoint,
    },
    BlockOnSignal {
        target: Endpoint,
    },
    EndSignal {
        target: Endpoint,
    },
    Reschedule {
        target: Endpoint,
        priority: Priority,
        quantum: Ticks,
    },
    MapRegion {
        target: Endpoint,
        size: u64,
        perms: MemoryPerms,
    },
    Uptime,
}

impl KernelCall {
    /// Returns the fixed number of this call
    pub fn number(&self) -> KernelCallNumber {
        match self {
            KernelCall::Send { .. } => KernelCallNumber::Send,
            KernelCall::Receive { .. } => KernelCallNumber::Receive,
            KernelCall::SendRec { .. } => KernelCallNumber::SendRec,
            KernelCall::Notify { .. } => KernelCallNumber::Notify,
            KernelCall::SendAsync { .. } => KernelCallNumber::SendAsync,
            KernelCall::CreateGrant { .. } => KernelCallNumber::CreateGrant,
            KernelCall::CreateIndirectGrant { .. } => KernelCallNumber::CreateIndirectGrant,
            KernelCall::SafeCopy(_) => KernelCallNumber::SafeCopy,
            KernelCall::SafeCopyVec(_) => KernelCallNumber::SafeCopyVec,
            KernelCall::RevokeGrant { .. } => KernelCallNumber::RevokeGrant,
            KernelCall::ArmTimer { .. } => KernelCallNumber::ArmTimer,
            KernelCall::CancelTimer { .. } => KernelCallNumber::CancelTimer,
            KernelCall::SetPrivileges { .. } => KernelCallNumber::SetPrivileges,
            KernelCall::Spawn { .. } => KernelCallNumber::Spawn,
            KernelCall::Kill { .. } => KernelCallNumber::Kill,
            KernelCall::Exit => KernelCallNumber::Exit,
            KernelCall::Clear { .. } => KernelCallNumber::Clear,
            KernelCall::Stop { .. } => KernelCallNumber::Stop,
            KernelCall::Resume { .. } => KernelCallNumber::Resume,
            KernelCall::BlockOnSignal { .. } => KernelCallNumber::BlockOnSignal,
            KernelCall::EndSignal { .. } => KernelCallNumber::EndSignal,
            KernelCall::Reschedule { .. } => KernelCallNumber::Reschedule,
            KernelCall::MapRegion { .. } => KernelCallNumber::MapRegion,
            KernelCall::Uptime => KernelCallNumber::Uptime,
        }
    }
}

/// Successful result of a kernel call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelCallReply {
    Ipc(IpcOutcome),
    Grant(GrantId),
    Copied(u64),
    Timer(TimerHandle),
    Spawned(Endpoint),
    Region(RegionId),
    Uptime(Tick),
    Done,
}
