//! # Core Types
//!
//! This crate defines the fundamental types shared by the kernel core and
//! its clients.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Explicit over implicit**: Processes, grants and memory are named by typed ids.
//! - **Stale handles fail loudly**: Ids carry generations so reuse is detected.
//! - **No ambient authority**: Cross-process memory access requires a grant.
//!
//! ## Key Types
//!
//! - [`Endpoint`]: Generation-tagged process identifier
//! - [`Priority`]: Scheduling level
//! - [`GrantId`]: Generation-tagged grant table index
//! - [`MemRange`]: Region-relative memory range

pub mod capability;
pub mod ids;
pub mod memory;
pub mod well_known;

pub use capability::{AccessMode, CopyDirection, GrantFlags, GrantId};
pub use ids::{Endpoint, Priority, ProcessSlot};
pub use memory::{MemRange, MemoryPerms, RegionId};
