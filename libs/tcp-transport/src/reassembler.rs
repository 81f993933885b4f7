use std::collections::BTreeMap;

use bytes::{Buf as _, Bytes};

use crate::ByteStream;
use crate::byte_stream::{Reader, Writer};

/// Orders and coalesces out-of-order substrings into an output [`ByteStream`].
///
/// Substrings are indexed by their absolute position in the stream. Anything
/// already pushed to the output, or beyond the output's remaining capacity, is
/// discarded on insert. Stored substrings never overlap; fresh bytes replace
/// whatever was stored at the same positions (identical content on a correct
/// peer, so replacement is safe).
#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    buffered: BTreeMap<u64, Bytes>,
    pending: u64,
    end_pos: Option<u64>,
}

impl Reassembler {
    pub fn new(output: ByteStream) -> Self {
        Self {
            output,
            buffered: BTreeMap::default(),
            pending: 0,
            end_pos: None,
        }
    }

    /// Inserts the substring starting at absolute position `first_index`.
    ///
    /// `is_last` marks `data` as ending the stream; once everything up to that
    /// point has been delivered, the output is closed.
    pub fn insert(&mut self, mut first_index: u64, mut data: Bytes, mut is_last: bool) {
        if data.is_empty() {
            if self.end_pos.is_none() && is_last {
                self.end_pos = Some(first_index);
            }
            if self.end_pos == Some(self.output.bytes_pushed()) {
                self.output.close();
            }
            return;
        }

        if self.output.is_closed() || self.output.available_capacity() == 0 {
            return;
        }

        let push_base = self.output.bytes_pushed();
        let cap_limit = push_base + self.output.available_capacity();

        if first_index.saturating_add(data.len() as u64) <= push_base || first_index >= cap_limit {
            return;
        }

        if first_index + data.len() as u64 > cap_limit {
            data.truncate((cap_limit - first_index) as usize);
            is_last = false;
        }

        if first_index < push_base {
            data.advance((push_base - first_index) as usize);
            first_index = push_base;
        }

        if self.end_pos.is_none() && is_last {
            self.end_pos = Some(first_index + data.len() as u64);
        }

        self.store(first_index, data);
        self.flush();

        if self.end_pos == Some(self.output.bytes_pushed()) {
            self.output.close();
        }
    }

    /// Total bytes buffered but not yet delivered to the output.
    pub fn bytes_pending(&self) -> u64 {
        self.pending
    }

    pub fn reader(&mut self) -> Reader<'_> {
        self.output.reader()
    }

    pub fn writer(&mut self) -> Writer<'_> {
        self.output.writer()
    }

    pub(crate) fn output(&self) -> &ByteStream {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    /// Stores `data` at `first_index`, evicting whatever was there before.
    ///
    /// Stored substrings straddling either end of the new interval are split
    /// first, so eviction only ever removes fully-covered pieces and `pending`
    /// stays exact.
    fn store(&mut self, first_index: u64, data: Bytes) {
        let end = first_index + data.len() as u64;

        self.split_at(end);
        self.split_at(first_index);

        let covered = self
            .buffered
            .range(first_index..end)
            .map(|(start, _)| *start)
            .collect::<Vec<_>>();

        for start in covered {
            if let Some(chunk) = self.buffered.remove(&start) {
                self.pending -= chunk.len() as u64;
            }
        }

        self.pending += data.len() as u64;
        self.buffered.insert(first_index, data);
    }

    /// Splits any stored substring straddling `position` into two adjacent pieces.
    fn split_at(&mut self, position: u64) {
        let Some((&start, chunk)) = self.buffered.range_mut(..position).next_back() else {
            return;
        };

        if start + chunk.len() as u64 > position {
            let right = chunk.split_off((position - start) as usize);
            self.buffered.insert(position, right);
        }
    }

    /// Delivers the contiguous prefix of buffered substrings to the output.
    fn flush(&mut self) {
        while let Some((start, chunk)) = self.buffered.pop_first() {
            if start != self.output.bytes_pushed() {
                self.buffered.insert(start, chunk);
                break;
            }

            self.pending -= chunk.len() as u64;
            self.output.push(chunk);
        }
    }
}
