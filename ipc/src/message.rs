//! Fixed-size message structure

use bitflags::bitflags;
use core_types::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of numeric words carried by every message
pub const MESSAGE_WORDS: usize = 6;

/// Number of opaque inline bytes carried by every message
pub const MESSAGE_INLINE_BYTES: usize = 32;

/// Message type used for kernel-synthesised notifications
pub const NOTIFY_MESSAGE: i32 = 0x1000;

/// Word index holding the tick at which a notification was generated
pub const NOTIFY_TIMESTAMP_WORD: usize = 0;

/// Word index holding the argument of an alarm notification
pub const NOTIFY_ARG_WORD: usize = 1;

bitflags! {
    /// Delivery flags set by the kernel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MessageFlags: u8 {
        /// Synthetic, content-less notification
        const NOTIFICATION = 1 << 0;
        /// Delivered from an asynchronous send ring
        const ASYNC = 1 << 1;
    }
}

/// A copy-by-value IPC message
///
/// Messages never point into sender memory. Anything larger than the inline
/// area travels through a grant instead.
///
/// The `source` field is always overwritten by the kernel on delivery, so a
/// receiver can trust it.
///
/// # Example
///
/// ```
/// use ipc::Message;
///
/// let msg = Message::new(42).with_word(0, 7).with_inline(b"hello");
/// assert_eq!(msg.m_type, 42);
/// assert_eq!(msg.words[0], 7);
/// assert_eq!(msg.inline_bytes(), b"hello");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sending endpoint, filled in by the kernel
    pub source: Endpoint,
    /// Protocol-defined request or reply type
    pub m_type: i32,
    /// Kernel delivery flags
    pub flags: MessageFlags,
    /// Numeric payload
    pub words: [u64; MESSAGE_WORDS],
    /// Opaque inline payload
    pub inline: [u8; MESSAGE_INLINE_BYTES],
    /// Number of meaningful bytes in `inline`
    pub inline_len: u8,
}

impl Message {
    /// Creates an empty message of the given type
    pub const fn new(m_type: i32) -> Self {
        Self {
            source: Endpoint::NONE,
            m_type,
            flags: MessageFlags::empty(),
            words: [0; MESSAGE_WORDS],
            inline: [0; MESSAGE_INLINE_BYTES],
            inline_len: 0,
        }
    }

    /// Sets one numeric word
    ///
    /// # Panics
    ///
    /// Panics if `index >= MESSAGE_WORDS`.
    pub fn with_word(mut self, index: usize, value: u64) -> Self {
        self.words[index] = value;
        self
    }

    /// Copies `bytes` into the inline area, truncating to its size
    pub fn with_inline(mut self, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MESSAGE_INLINE_BYTES);
        self.inline = [0; MESSAGE_INLINE_BYTES];
        self.inline[..len].copy_from_slice(&bytes[..len]);
        self.inline_len = len as u8;
        self
    }

    /// Returns the meaningful inline bytes
    pub fn inline_bytes(&self) -> &[u8] {
        &self.inline[..self.inline_len as usize]
    }

    /// Builds the synthetic message delivered for a notification
    pub fn notification(source: Endpoint, timestamp: u64) -> Self {
        let mut msg = Self::new(NOTIFY_MESSAGE).with_word(NOTIFY_TIMESTAMP_WORD, timestamp);
        msg.source = source;
        msg.flags = MessageFlags::NOTIFICATION;
        msg
    }

    /// True if this message was synthesised by `notify`
    pub fn is_notification(&self) -> bool {
        self.flags.contains(MessageFlags::NOTIFICATION)
    }

    /// True if this message arrived through an asynchronous send ring
    pub fn is_async(&self) -> bool {
        self.flags.contains(MessageFlags::ASYNC)
    }

    /// Returns a copy stamped by the kernel with the real sender
    pub fn stamped(mut self, source: Endpoint, flags: MessageFlags) -> Self {
        self.source = source;
        self.flags = flags;
        self
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg(type={}, from={})", self.m_type, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ProcessSlot;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(5);
        assert_eq!(msg.m_type, 5);
        assert_eq!(msg.source, Endpoint::NONE);
        assert!(msg.flags.is_empty());
        assert!(msg.inline_bytes().is_empty());
    }

    #[test]
    fn test_inline_truncation() {
        let long = [7u8; 100];
        let msg = Message::new(1).with_inline(&long);
        assert_eq!(msg.inline_bytes().len(), MESSAGE_INLINE_BYTES);
        assert!(msg.inline_bytes().iter().all(|b| *b == 7));
    }

    #[test]
    fn test_inline_replaced_not_appended() {
        let msg = Message::new(1).with_inline(b"abcdef").with_inline(b"xy");
        assert_eq!(msg.inline_bytes(), b"xy");
        assert_eq!(msg.inline[2], 0);
    }

    #[test]
    fn test_notification_message() {
        let src = Endpoint::new(ProcessSlot(3), 1);
        let msg = Message::notification(src, 99);
        assert!(msg.is_notification());
        assert!(!msg.is_async());
        assert_eq!(msg.m_type, NOTIFY_MESSAGE);
        assert_eq!(msg.source, src);
        assert_eq!(msg.words[NOTIFY_TIMESTAMP_WORD], 99);
    }

    #[test]
    fn test_stamped_overrides_source() {
        let forged = Endpoint::new(ProcessSlot(9), 9);
        let real = Endpoint::new(ProcessSlot(2), 0);
        let mut msg = Message::new(3);
        msg.source = forged;

        let delivered = msg.stamped(real, MessageFlags::ASYNC);
        assert_eq!(delivered.source, real);
        assert!(delivered.is_async());
    }

    #[test]
    fn test_message_serde() {
        let msg = Message::new(11).with_word(2, 1234).with_inline(b"payload");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
