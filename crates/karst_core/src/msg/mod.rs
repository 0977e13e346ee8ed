//! # Message Transport
//!
//! A double-buffered queue moving variable-length, tagged messages from any
//! number of producer threads to exactly one consumer thread.
//!
//! ## The Problem
//!
//! ```text
//! Worker threads:  ALLOCATE + WRITE message bodies
//! Consumer thread: SCAN + PROCESS messages every frame
//!
//! One ring buffer + a lock per byte written: contention
//! Fully lock-free variable-length framing: complexity nobody can review
//! ```
//!
//! ## The Solution: Two Buffers, Rotated
//!
//! ```text
//! Producers append to buffer A  |  Consumer drains buffer B
//!
//! When B runs dry: ROTATE (under a short lock)
//!   A becomes the read buffer, the drained B becomes the write target
//! ```
//!
//! The lock covers only buffer selection, growth and cursor bookkeeping.
//! Body bytes are written outside the lock, into memory reserved
//! exclusively for the writing producer; a per-message under-construction
//! flag keeps half-written messages invisible to the consumer.

mod header;
mod queue;

pub use header::ReleaseFn;
pub use queue::{message_queue, Message, MessageReceiver, MessageSender, MessageWriter};
