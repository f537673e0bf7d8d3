//! Stable endpoints for kernel tasks and boot-image servers.
//!
//! Kernel tasks occupy the first table slots and never change generation.
//! The boot-image servers are a convention shared with user space; the
//! kernel itself never interprets them.

use crate::{Endpoint, ProcessSlot};

/// Number of table slots reserved for kernel tasks
pub const KERNEL_TASK_COUNT: u32 = 2;

/// Clock task: source of alarm notifications
pub const CLOCK: Endpoint = Endpoint::new(ProcessSlot(0), 0);

/// System task: parent of every boot-image process
pub const SYSTEM: Endpoint = Endpoint::new(ProcessSlot(1), 0);

/// First slot handed to boot-image processes
pub const FIRST_USER_SLOT: ProcessSlot = ProcessSlot(KERNEL_TASK_COUNT);

/// Process manager (fork/exit/signals)
pub const PROCESS_MANAGER: Endpoint = Endpoint::new(ProcessSlot(KERNEL_TASK_COUNT), 0);

/// File-system coordinator
pub const FILE_SYSTEM: Endpoint = Endpoint::new(ProcessSlot(KERNEL_TASK_COUNT + 1), 0);

/// Memory manager (address spaces, page faults)
pub const MEMORY_MANAGER: Endpoint = Endpoint::new(ProcessSlot(KERNEL_TASK_COUNT + 2), 0);

/// Recovery supervisor (restarts crashed servers)
pub const SUPERVISOR: Endpoint = Endpoint::new(ProcessSlot(KERNEL_TASK_COUNT + 3), 0);

/// Returns true if `endpoint` names a kernel task
pub fn is_kernel_task(endpoint: Endpoint) -> bool {
    !endpoint.is_reserved() && endpoint.slot().0 < KERNEL_TASK_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_tasks() {
        assert!(is_kernel_task(CLOCK));
        assert!(is_kernel_task(SYSTEM));
        assert!(!is_kernel_task(PROCESS_MANAGER));
        assert!(!is_kernel_task(Endpoint::ANY));
    }

    #[test]
    fn test_boot_servers_follow_kernel_tasks() {
        assert_eq!(PROCESS_MANAGER.slot(), FIRST_USER_SLOT);
        assert_eq!(FILE_SYSTEM.slot().0, FIRST_USER_SLOT.0 + 1);
        assert_eq!(MEMORY_MANAGER.slot().0, FIRST_USER_SLOT.0 + 2);
        assert_eq!(SUPERVISOR.slot().0, FIRST_USER_SLOT.0 + 3);
    }
}
