//! # Double-Buffered Message Queue
//!
//! Multi-producer, single-consumer transport for variable-length tagged
//! messages. Producers reserve space under a short lock and write bodies
//! outside it; the consumer drains one buffer while the other collects new
//! messages, and the two rotate when the read side runs dry.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for in-place message framing in raw
//! byte buffers. All unsafe blocks are carefully reviewed and documented.
//! The invariants:
//!
//! - a header is fully written under the lock before `used` advances past it
//! - body bytes belong exclusively to their producer until the
//!   under-construction flag is cleared (`Release`), and to the consumer
//!   once it has observed the clear (`Acquire`)
//! - a buffer only becomes the write target after it was fully drained, so
//!   resetting `used` never discards live messages
//! - the write buffer only grows (and may therefore move) while no message
//!   in it is under construction

#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, realloc, Layout};
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::header::{
    stride, MessageHeader, ReleaseFn, HEADER_ALIGN, HEADER_SIZE, PAYLOAD_IS_CALLBACK,
    UNDER_CONSTRUCTION,
};

const NUM_BUFFERS: usize = 2;

/// Smallest capacity a write buffer ever grows to.
const WRITEBUF_MIN_ALLOC: usize = 64;

/// Type tag carried by callback messages; never surfaces to consumers.
const CALLBACK_MSG_TYPE: i32 = -1;

/// Sleep granularity between retrieve polls.
const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// One growable byte buffer. `used` is the producers' append cursor,
/// `index` the consumer's scan cursor.
struct Buffer {
    data: *mut u8,
    capacity: usize,
    used: usize,
    index: usize,
}

impl Buffer {
    const fn new() -> Self {
        Self {
            data: ptr::null_mut(),
            capacity: 0,
            used: 0,
            index: 0,
        }
    }

    /// Grows to at least `min_capacity`, at least doubling.
    fn grow(&mut self, min_capacity: usize) {
        let new_capacity = min_capacity
            .max(self.capacity * 2)
            .max(WRITEBUF_MIN_ALLOC);
        assert!(
            new_capacity <= isize::MAX as usize - (HEADER_ALIGN - 1),
            "message buffer too large"
        );

        // SAFETY: the alignment is a power of two and the size was checked.
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_capacity, HEADER_ALIGN) };
        let data = if self.data.is_null() {
            // SAFETY: the layout has nonzero size (min-alloc floor).
            unsafe { alloc(new_layout) }
        } else {
            // SAFETY: `data` came from this allocator with the old layout.
            unsafe {
                let old_layout = Layout::from_size_align_unchecked(self.capacity, HEADER_ALIGN);
                realloc(self.data, old_layout, new_capacity)
            }
        };
        assert!(!data.is_null(), "message buffer allocation failed");

        self.data = data;
        self.capacity = new_capacity;
    }

    fn header_at(&self, offset: usize) -> *mut MessageHeader {
        debug_assert!(offset + HEADER_SIZE <= self.capacity);
        // SAFETY: `offset` stays inside the allocation per the cursor
        // invariants.
        unsafe { self.data.add(offset).cast::<MessageHeader>() }
    }
}

struct QueueInner {
    buffers: [Buffer; NUM_BUFFERS],
    /// `None` until the first rotation picks a read buffer.
    readbuf: Option<usize>,
    writebuf: usize,
}

// SAFETY: QueueInner only holds raw allocation handles; every access is
// serialized by the queue mutex or confined to the single consumer.
unsafe impl Send for QueueInner {}

impl QueueInner {
    /// Scans for the next finished message, rotating buffers when the read
    /// side is exhausted. Runs entirely under the queue lock.
    fn try_retrieve(&mut self) -> Option<*mut MessageHeader> {
        let exhausted = match self.readbuf {
            None => true,
            Some(readbuf) => self.buffers[readbuf].index == self.buffers[readbuf].used,
        };

        if exhausted {
            // Rotate: the previous write buffer becomes the read buffer,
            // the drained one becomes the new write target. Its bytes were
            // all delivered in an earlier cycle, so resetting `used`
            // discards nothing live.
            let writebuf = (self.writebuf + 1) % NUM_BUFFERS;
            let readbuf = (writebuf + 1) % NUM_BUFFERS;
            self.writebuf = writebuf;
            self.readbuf = Some(readbuf);
            self.buffers[readbuf].index = 0;
            self.buffers[writebuf].used = 0;
            tracing::trace!(readbuf, writebuf, "rotated message buffers");
        }

        let readbuf = self.readbuf?;
        let buffer = &mut self.buffers[readbuf];
        if buffer.index == buffer.used {
            return None;
        }

        debug_assert!(buffer.index + HEADER_SIZE <= buffer.used);
        let header = buffer.header_at(buffer.index);

        // SAFETY: the header at `index` was fully written under the lock
        // before `used` advanced past it.
        let flags = unsafe { (*header).flags.load(Ordering::Acquire) };
        if flags & UNDER_CONSTRUCTION != 0 {
            // FIFO per buffer: never deliver around an in-flight message.
            return None;
        }

        // SAFETY: as above; `length` is immutable once the header exists.
        let length = unsafe { (*header).length };
        buffer.index += stride(length);
        Some(header)
    }
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    /// Messages allocated but not yet finished, across both buffers.
    incomplete: AtomicI32,
}

impl QueueShared {
    /// Reserves space for a message and stamps its header. The returned
    /// header stays under construction until [`finish`](Self::finish).
    fn alloc(&self, body_len: usize, msg_type: i32, release: Option<ReleaseFn>) -> *mut MessageHeader {
        let mut inner = self.inner.lock();
        let writebuf = inner.writebuf;
        let buffer = &mut inner.buffers[writebuf];

        let new_used = buffer.used + stride(body_len);
        if new_used > buffer.capacity {
            // Growth may move the buffer; wait out producers still writing
            // into it. Their finish path takes no lock, so this terminates.
            while self.incomplete.load(Ordering::Acquire) > 0 {
                std::hint::spin_loop();
            }
            buffer.grow(new_used);
            tracing::trace!(
                buffer = writebuf,
                capacity = buffer.capacity,
                "grew message write buffer"
            );
        }

        self.incomplete.fetch_add(1, Ordering::AcqRel);

        let header = buffer.header_at(buffer.used);
        // SAFETY: the bytes [used, new_used) were reserved above and are
        // not visible to the consumer until `used` advances.
        unsafe {
            header.write(MessageHeader {
                length: body_len,
                msg_type,
                flags: AtomicU32::new(UNDER_CONSTRUCTION),
                release,
            });
        }
        buffer.used = new_used;

        header
    }

    /// Publishes a message: clears the under-construction flag so the
    /// consumer may deliver it.
    fn finish(&self, header: *mut MessageHeader) {
        // SAFETY: only called with headers produced by `alloc`. The
        // `Release` ordering publishes the producer's body writes.
        unsafe {
            (*header).flags.fetch_and(!UNDER_CONSTRUCTION, Ordering::Release);
        }
        self.incomplete.fetch_sub(1, Ordering::AcqRel);
    }

    fn try_retrieve(&self) -> Option<*mut MessageHeader> {
        self.inner.lock().try_retrieve()
    }
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        // Unretrieved messages still own their bodies; run their release
        // callbacks before the buffers go away.
        let inner = self.inner.get_mut();
        while let Some(header) = inner.try_retrieve() {
            // SAFETY: the header was just retrieved; each is released once.
            unsafe { release_message(header) };
        }
        for buffer in &mut inner.buffers {
            if !buffer.data.is_null() {
                // SAFETY: allocated in `grow` with exactly this layout.
                unsafe {
                    dealloc(
                        buffer.data,
                        Layout::from_size_align_unchecked(buffer.capacity, HEADER_ALIGN),
                    );
                }
            }
        }
    }
}

/// Release thunk dropping a `T` body in place.
///
/// # Safety
///
/// `body` must point at a live, initialized `T`.
unsafe fn release_in_place<T>(body: *mut u8) {
    ptr::drop_in_place(body.cast::<T>());
}

/// Runs a message's release callback.
///
/// # Safety
///
/// `header` must point at a finished message whose body has not been
/// released yet.
unsafe fn release_message(header: *mut MessageHeader) {
    if let Some(release) = (*header).release {
        release(header.add(1).cast::<u8>());
    }
}

/// Creates a connected queue and returns its two endpoints.
///
/// Clone the sender freely across producer threads; the receiver is the
/// single consumer and cannot be cloned.
#[must_use]
pub fn message_queue() -> (MessageSender, MessageReceiver) {
    let shared = Arc::new(QueueShared {
        inner: Mutex::new(QueueInner {
            buffers: [Buffer::new(), Buffer::new()],
            readbuf: None,
            writebuf: 0,
        }),
        incomplete: AtomicI32::new(0),
    });
    (
        MessageSender {
            shared: Arc::clone(&shared),
        },
        MessageReceiver { shared },
    )
}

/// Producer endpoint of a message queue. Cheap to clone; usable from any
/// number of threads concurrently.
#[derive(Clone)]
pub struct MessageSender {
    shared: Arc<QueueShared>,
}

impl MessageSender {
    /// Reserves a `body_len`-byte message and returns a writer for
    /// constructing the body in place, outside any lock.
    ///
    /// Finish (or drop) the writer before allocating the next message from
    /// the same thread: an unfinished writer blocks buffer growth.
    pub fn alloc_message(
        &self,
        body_len: usize,
        msg_type: i32,
        release: Option<ReleaseFn>,
    ) -> MessageWriter<'_> {
        let header = self.shared.alloc(body_len, msg_type, release);
        MessageWriter {
            shared: &*self.shared,
            header,
            finished: false,
        }
    }

    /// Posts a message with no body.
    pub fn post(&self, msg_type: i32) {
        self.alloc_message(0, msg_type, None).finish();
    }

    /// Posts `value` as the message body. The consumer reads it with
    /// [`Message::body`]; the value is dropped in place when the message is
    /// released.
    pub fn send<T: Send + 'static>(&self, msg_type: i32, value: T) {
        assert!(
            mem::align_of::<T>() <= HEADER_ALIGN,
            "message body alignment exceeds header alignment"
        );
        let mut writer =
            self.alloc_message(mem::size_of::<T>(), msg_type, Some(release_in_place::<T>));
        // SAFETY: the body slot holds size_of::<T>() reserved bytes and the
        // alignment was checked above.
        unsafe { writer.body_ptr().cast::<T>().write(value) };
        writer.finish();
    }

    /// Posts a callback. The consumer executes it inside its retrieve loop
    /// and moves on; callbacks are never returned as messages.
    pub fn post_call(&self, callback: fn()) {
        let mut writer = self.alloc_message(mem::size_of::<fn()>(), CALLBACK_MSG_TYPE, None);
        // SAFETY: the body slot holds exactly one fn pointer.
        unsafe { writer.body_ptr().cast::<fn()>().write(callback) };
        // SAFETY: the header is exclusively this writer's until finished.
        unsafe {
            (*writer.header).flags.fetch_or(PAYLOAD_IS_CALLBACK, Ordering::Relaxed);
        }
        writer.finish();
    }
}

/// In-place construction guard for one message. The message is published
/// when the writer is finished or dropped.
pub struct MessageWriter<'a> {
    shared: &'a QueueShared,
    header: *mut MessageHeader,
    finished: bool,
}

impl MessageWriter<'_> {
    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: the header is exclusively this writer's until finished.
        unsafe { (*self.header).length }
    }

    /// Whether the message has a zero-length body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw pointer to the reserved body bytes.
    #[must_use]
    pub fn body_ptr(&mut self) -> *mut u8 {
        // SAFETY: the body starts right after the header, inside the
        // reservation made by alloc.
        unsafe { self.header.add(1).cast::<u8>() }
    }

    /// Copies `src` into the body. `src` must be exactly the body length.
    pub fn write_bytes(&mut self, src: &[u8]) {
        assert_eq!(src.len(), self.len(), "body length mismatch");
        // SAFETY: the body slot holds exactly `len` reserved bytes.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.body_ptr(), src.len()) };
    }

    /// Publishes the message to the consumer. Dropping the writer does the
    /// same; this form marks the handoff explicitly.
    pub fn finish(mut self) {
        self.do_finish();
    }

    fn do_finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.finish(self.header);
        }
    }
}

impl Drop for MessageWriter<'_> {
    fn drop(&mut self) {
        self.do_finish();
    }
}

/// Consumer endpoint of a message queue. Exactly one exists per queue, and
/// retrieval requires exclusive access, so the single-consumer rule holds
/// by construction.
pub struct MessageReceiver {
    shared: Arc<QueueShared>,
}

impl MessageReceiver {
    /// Single non-blocking retrieve attempt.
    ///
    /// Returns `None` when no finished message is pending - including when
    /// bytes exist but the next message in line is still under
    /// construction (delivery is FIFO per buffer; nothing overtakes an
    /// in-flight message).
    pub fn try_retrieve(&mut self) -> Option<Message<'_>> {
        let header = self.next_finished_header()?;
        Some(Message {
            header,
            _receiver: PhantomData,
        })
    }

    /// Polls until a message arrives or `timeout` elapses, sleeping briefly
    /// between attempts. A zero timeout makes a single attempt.
    pub fn retrieve(&mut self, timeout: Duration) -> Option<Message<'_>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(header) = self.next_finished_header() {
                return Some(Message {
                    header,
                    _receiver: PhantomData,
                });
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Pulls the next finished message, executing and consuming posted
    /// callbacks along the way.
    fn next_finished_header(&self) -> Option<*mut MessageHeader> {
        loop {
            let header = self.shared.try_retrieve()?;
            // SAFETY: retrieved headers are finished and exclusively the
            // consumer's.
            let flags = unsafe { (*header).flags.load(Ordering::Relaxed) };
            if flags & PAYLOAD_IS_CALLBACK == 0 {
                return Some(header);
            }
            // SAFETY: callback bodies hold exactly one fn pointer.
            let callback = unsafe { header.add(1).cast::<fn()>().read() };
            callback();
        }
    }
}

/// A retrieved message. Borrows the receiver, so the buffer it points into
/// cannot rotate or move while it is alive; the release callback runs when
/// it is dropped.
pub struct Message<'a> {
    header: *mut MessageHeader,
    _receiver: PhantomData<&'a mut MessageReceiver>,
}

impl Message<'_> {
    /// Caller-defined type tag.
    #[must_use]
    pub fn msg_type(&self) -> i32 {
        // SAFETY: a retrieved header is exclusively the consumer's.
        unsafe { (*self.header).msg_type }
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: as above.
        unsafe { (*self.header).length }
    }

    /// Whether the message has a zero-length body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Body as raw bytes. Meaningful for messages whose producers wrote
    /// byte payloads (see [`MessageWriter::write_bytes`]).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the producer wrote the body before finishing; the flag
        // handoff makes those writes visible here.
        unsafe { slice::from_raw_parts(self.header.add(1).cast::<u8>(), self.len()) }
    }

    /// Typed view of the body.
    ///
    /// # Safety
    ///
    /// The type tag must guarantee the body is a live `T` (it was posted
    /// with [`MessageSender::send`] for this tag).
    #[must_use]
    pub unsafe fn body<T>(&self) -> &T {
        debug_assert_eq!(mem::size_of::<T>(), self.len());
        &*self.header.add(1).cast::<T>()
    }
}

impl Drop for Message<'_> {
    fn drop(&mut self) {
        // SAFETY: each retrieved message is released exactly once.
        unsafe { release_message(self.header) };
    }
}
