//! # Kernel API
//!
//! This crate defines the interface between processes and the kernel core.
//!
//! ## Philosophy
//!
//! The kernel provides **mechanisms**, not policies:
//! - Message passing (rendezvous, not buffering)
//! - Scheduling (priorities and quanta, not fairness heuristics)
//! - Memory grants (explicit sharing, no ambient access)
//! - Timers (explicit ticks, not wall-clock time)
//!
//! ## Design Goals
//!
//! 1. **Testability**: The entire API can be driven from a test
//! 2. **Explicitness**: Every call names its caller; failures are return values
//! 3. **Type safety**: Endpoints, grants and ticks are distinct types
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - POSIX (no fork/exec semantics, no files)
//! - A driver interface
//! - A specific trap mechanism (the trait can be implemented many ways)

pub mod error;
pub mod kernel;
pub mod privileges;
pub mod syscalls;
pub mod time;

pub use error::{GrantDenial, KernelError};
pub use kernel::{GrantRef, IpcCompletion, IpcOutcome, KernelApi, SafeCopyRequest};
pub use privileges::{Privileges, SendTargets};
pub use syscalls::{CallMask, KernelCall, KernelCallNumber, KernelCallReply};
pub use time::{Tick, Ticks, TimerHandle};
