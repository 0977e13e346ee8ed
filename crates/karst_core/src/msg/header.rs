//! # In-Buffer Message Framing
//!
//! Every message is a [`MessageHeader`] written directly into the queue's
//! byte buffer, immediately followed by the body. Strides are padded to the
//! header's alignment so the next header lands aligned no matter what body
//! length preceded it.

use std::mem;
use std::sync::atomic::AtomicU32;

/// The message body is still being written by its producer; the consumer
/// must not observe it.
pub(crate) const UNDER_CONSTRUCTION: u32 = 1;

/// The body is a plain `fn()` the consumer executes instead of returning
/// the message.
pub(crate) const PAYLOAD_IS_CALLBACK: u32 = 1 << 1;

/// Destructor for a message body, invoked exactly once before the body's
/// bytes are recycled: by the consumer when it drops a retrieved message,
/// or by queue teardown for messages never retrieved.
pub type ReleaseFn = unsafe fn(*mut u8);

/// Framing prefix in front of every message body.
#[repr(C)]
pub(crate) struct MessageHeader {
    /// Body length in bytes, not counting this header or padding.
    pub(crate) length: usize,
    /// Caller-defined type tag.
    pub(crate) msg_type: i32,
    /// Flag word; cleared of [`UNDER_CONSTRUCTION`] with `Release` ordering
    /// when the producer finishes, observed with `Acquire` by the consumer.
    pub(crate) flags: AtomicU32,
    /// Body destructor, if the body owns anything.
    pub(crate) release: Option<ReleaseFn>,
}

pub(crate) const HEADER_SIZE: usize = mem::size_of::<MessageHeader>();
pub(crate) const HEADER_ALIGN: usize = mem::align_of::<MessageHeader>();

/// Bytes a message occupies in the buffer: header plus body, padded so the
/// following header stays aligned.
pub(crate) const fn stride(body_len: usize) -> usize {
    let padded = (body_len + HEADER_ALIGN - 1) & !(HEADER_ALIGN - 1);
    HEADER_SIZE + padded
}
