use std::collections::VecDeque;

use bytes::{Buf as _, Bytes};

/// A bounded in-memory byte FIFO with separate producer and consumer capabilities.
///
/// The [`Writer`] appends at the tail until the stream is closed, the [`Reader`]
/// consumes from the head. Both sides observe a shared error flag that an owner
/// can raise out-of-band (e.g. on RST).
#[derive(Debug)]
pub struct ByteStream {
    capacity: u64,
    chunks: VecDeque<Bytes>,
    pushed: u64,
    popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            chunks: VecDeque::default(),
            pushed: 0,
            popped: 0,
            closed: false,
            error: false,
        }
    }

    pub fn writer(&mut self) -> Writer<'_> {
        Writer { stream: self }
    }

    pub fn reader(&mut self) -> Reader<'_> {
        Reader { stream: self }
    }

    pub(crate) fn push(&mut self, mut data: Bytes) {
        if data.is_empty() || self.available_capacity() == 0 || self.closed {
            return;
        }

        if data.len() as u64 > self.available_capacity() {
            data.truncate(self.available_capacity() as usize);
        }

        self.pushed += data.len() as u64;
        self.chunks.push_back(data);
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// A contiguous view of some prefix of the buffered bytes.
    ///
    /// Only the frontmost chunk is returned; callers loop peek/pop to drain more.
    pub(crate) fn peek(&self) -> &[u8] {
        self.chunks.front().map_or(&[], |chunk| chunk.as_ref())
    }

    pub(crate) fn pop(&mut self, mut n: u64) {
        debug_assert!(n <= self.bytes_buffered());

        self.popped += n;

        while n != 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            if n < front.len() as u64 {
                front.advance(n as usize);
                break;
            }

            n -= front.len() as u64;
            self.chunks.pop_front();
        }
    }

    pub(crate) fn bytes_pushed(&self) -> u64 {
        self.pushed
    }

    pub(crate) fn bytes_popped(&self) -> u64 {
        self.popped
    }

    pub(crate) fn bytes_buffered(&self) -> u64 {
        self.pushed - self.popped
    }

    pub(crate) fn available_capacity(&self) -> u64 {
        self.capacity - self.bytes_buffered()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.closed && self.bytes_buffered() == 0
    }

    pub(crate) fn has_error(&self) -> bool {
        self.error
    }

    pub(crate) fn set_error(&mut self) {
        self.error = true;
    }
}

/// The producer capability over a [`ByteStream`].
pub struct Writer<'a> {
    stream: &'a mut ByteStream,
}

impl Writer<'_> {
    /// Appends `data`, truncating to the available capacity.
    ///
    /// Bytes beyond capacity are dropped silently, as is any push after close.
    pub fn push(&mut self, data: Bytes) {
        self.stream.push(data);
    }

    /// Signals that nothing more will be pushed.
    pub fn close(&mut self) {
        self.stream.close();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub fn available_capacity(&self) -> u64 {
        self.stream.available_capacity()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.stream.bytes_pushed()
    }

    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }

    pub fn set_error(&mut self) {
        self.stream.set_error();
    }
}

/// The consumer capability over a [`ByteStream`].
pub struct Reader<'a> {
    stream: &'a mut ByteStream,
}

impl Reader<'_> {
    /// A contiguous view of some prefix of the buffered bytes, possibly not all of them.
    pub fn peek(&self) -> &[u8] {
        self.stream.peek()
    }

    /// Consumes exactly `n` buffered bytes. `n` must not exceed [`Reader::bytes_buffered`].
    pub fn pop(&mut self, n: u64) {
        self.stream.pop(n);
    }

    /// True once the stream is closed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    pub fn bytes_buffered(&self) -> u64 {
        self.stream.bytes_buffered()
    }

    pub fn bytes_popped(&self) -> u64 {
        self.stream.bytes_popped()
    }

    pub fn has_error(&self) -> bool {
        self.stream.has_error()
    }

    pub fn set_error(&mut self) {
        self.stream.set_error();
    }
}
