//! Kernel Scenario Test Utilities
//!
//! Shared fixtures for the scenario tests under `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Black box**: Scenarios drive the kernel only through [`KernelApi`]
//!   calls and clock interrupts
//! - **Deterministic time**: Ticks move only when a test advances them
//! - **Invariants after every step**: [`check_invariants`] re-derives the
//!   scheduler and IPC bookkeeping from scratch and compares

use core_types::{CopyDirection, Endpoint, GrantId, MemRange};
use ipc::Message;
use kernel_api::{GrantRef, IpcCompletion, SafeCopyRequest};
use kernel_core::{Kernel, RunState};

pub use kernel_api::KernelApi;
pub use kernel_core::test_utils::{KernelBuilder, TestKernel};

/// Request to copy out of a grant into the caller's `local` range
pub fn read_from(owner: Endpoint, grant: GrantId, offset: u64, local: MemRange) -> SafeCopyRequest {
    SafeCopyRequest {
        source: GrantRef::new(owner, grant),
        offset,
        direction: CopyDirection::FromGrantor,
        local,
    }
}

/// Request to copy the caller's `local` range into a grant
pub fn write_to(owner: Endpoint, grant: GrantId, offset: u64, local: MemRange) -> SafeCopyRequest {
    SafeCopyRequest {
        direction: CopyDirection::ToGrantor,
        ..read_from(owner, grant, offset, local)
    }
}

/// Takes the message a blocked receive completed with
///
/// # Panics
///
/// Panics if `endpoint` has no received message waiting.
pub fn received(kernel: &mut Kernel, endpoint: Endpoint) -> Message {
    match kernel.take_ipc_result(endpoint) {
        Some(Ok(IpcCompletion::Received(msg))) => msg,
        other => panic!("{} has no received message: {:?}", endpoint, other),
    }
}

/// Checks the cross-structure invariants of a kernel
///
/// - at most one process runs, and it is runnable
/// - every other runnable user process sits in exactly one ready queue,
///   at its own priority
/// - no blocked, held or dead process is queued
/// - every blocked sender is listed by its receiver, and every listed
///   sender is blocked on that receiver
///
/// # Panics
///
/// Panics with a description of the first violation found.
pub fn check_invariants(kernel: &Kernel) {
    let scheduler = kernel.scheduler();
    let levels = scheduler.queue_count();
    let queued: Vec<(usize, Endpoint)> = (0..levels)
        .flat_map(|level| scheduler.queue(level).into_iter().map(move |ep| (level, ep)))
        .collect();

    if let Some(current) = kernel.current() {
        assert_eq!(
            kernel.state_of(current),
            Some(RunState::Runnable),
            "running process {} is not runnable",
            current
        );
        assert!(
            !queued.iter().any(|(_, ep)| *ep == current),
            "running process {} is also queued",
            current
        );
    }

    for process in kernel.processes() {
        let entries: Vec<usize> = queued
            .iter()
            .filter(|(_, ep)| *ep == process.endpoint)
            .map(|(level, _)| *level)
            .collect();
        let running = kernel.current() == Some(process.endpoint);

        if process.is_kernel_task() {
            assert!(entries.is_empty() && !running, "kernel task {} scheduled", process.endpoint);
            continue;
        }
        match process.state {
            RunState::Runnable if !running => {
                assert_eq!(
                    entries,
                    vec![process.priority.level()],
                    "runnable {} queued wrongly",
                    process.endpoint
                );
            }
            RunState::Runnable => {}
            state => {
                assert!(
                    entries.is_empty() && !running,
                    "{} is {:?} but scheduled",
                    process.endpoint,
                    state
                );
            }
        }

        for sender in &process.senders {
            assert_eq!(
                kernel.state_of(*sender),
                Some(RunState::Sending { to: process.endpoint }),
                "{} lists {} as a sender",
                process.endpoint,
                sender
            );
        }
        if let RunState::Sending { to } = process.state {
            let listed = kernel
                .process(to)
                .is_some_and(|receiver| receiver.senders.contains(&process.endpoint));
            assert!(listed, "{} blocked on {} but not listed", process.endpoint, to);
        }
    }
}
