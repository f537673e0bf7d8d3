//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware traits the kernel core depends on.
//!
//! ## Philosophy
//!
//! **The core never touches a device directly.**
//!
//! The only device the kernel core needs is a tick source for the clock
//! interrupt. Architecture crates implement it for real hardware; tests use a
//! simulated clock.

pub mod timer;

pub use timer::TimerDevice;
