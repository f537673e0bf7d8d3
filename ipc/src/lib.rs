//! # Inter-Process Communication (IPC)
//!
//! This crate defines the data that moves between processes through the
//! kernel core.
//!
//! ## Philosophy
//!
//! - **Copy by value**: A message is a small fixed-size record, never a
//!   pointer into the sender's memory
//! - **Kernel-stamped**: The source of every delivered message is written by
//!   the kernel, not by the sender
//! - **Explicit filters**: A receiver states which senders it accepts
//!
//! ## Architecture
//!
//! - [`Message`]: The fixed-size payload of every send, receive and reply
//! - [`SourceFilter`]: `Any` or one specific endpoint
//! - [`NotifyBitmap`]: Per-receiver set of pending notifications
//!
//! Bulk data does not travel in messages. It moves through grants, which the
//! kernel validates separately.

pub mod filter;
pub mod message;
pub mod notify;

pub use filter::SourceFilter;
pub use message::{
    Message, MessageFlags, MESSAGE_INLINE_BYTES, MESSAGE_WORDS, NOTIFY_ARG_WORD, NOTIFY_MESSAGE,
    NOTIFY_TIMESTAMP_WORD,
};
pub use notify::NotifyBitmap;
