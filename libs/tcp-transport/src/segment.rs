use bytes::Bytes;

use crate::SeqNum;

/// One TCP segment as produced by a [`crate::Sender`].
///
/// The wire encoding is up to an external codec; this carries exactly the
/// fields the transport state machines care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number of the first "thing" in this segment (SYN counts).
    pub seqno: SeqNum,
    pub syn: bool,
    pub payload: Bytes,
    pub fin: bool,
    pub rst: bool,
}

impl Segment {
    /// How many sequence numbers this segment occupies. SYN and FIN count as one each.
    pub fn sequence_length(&self) -> u64 {
        u64::from(self.syn) + self.payload.len() as u64 + u64::from(self.fin)
    }
}

/// A [`crate::Receiver`]'s view of the connection, sent back to the peer's sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// The next sequence number the receiver needs. Absent until a SYN arrived.
    pub ackno: Option<SeqNum>,
    pub window_size: u16,
    pub rst: bool,
}
