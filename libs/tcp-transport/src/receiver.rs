use crate::byte_stream::Reader;
use crate::{Ack, ByteStream, Reassembler, Segment, SeqNum};

/// The receiving half of a connection.
///
/// Decodes inbound segments from sequence space into stream positions and feeds
/// them to a [`Reassembler`]; produces the [`Ack`]s the peer's sender needs.
#[derive(Debug)]
pub struct Receiver {
    /// The peer's ISN, captured from the first SYN.
    base_seqno: Option<SeqNum>,
    reassembler: Reassembler,
}

impl Receiver {
    pub fn new(capacity: u64) -> Self {
        Self {
            base_seqno: None,
            reassembler: Reassembler::new(ByteStream::new(capacity)),
        }
    }

    pub fn receive(&mut self, segment: Segment) {
        if self.reassembler.output().has_error() {
            return;
        }

        if segment.rst {
            self.reassembler.output_mut().set_error();
            return;
        }

        let base_seqno = match self.base_seqno {
            Some(base) => base,
            None if segment.syn => *self.base_seqno.insert(segment.seqno),
            None => {
                tracing::trace!(seqno = %segment.seqno, "Dropping segment before SYN");
                return;
            }
        };

        // The next byte we need, in absolute sequence space (+1 for the SYN).
        let expected_seq = self.reassembler.output().bytes_pushed() + 1;
        let absolute_seq = segment.seqno.unwrap(base_seqno, expected_seq);

        // Absolute seq 0 is the SYN itself; a non-SYN segment there carries no stream bytes.
        let Some(stream_index) = (absolute_seq + u64::from(segment.syn)).checked_sub(1) else {
            return;
        };

        self.reassembler
            .insert(stream_index, segment.payload, segment.fin);
    }

    /// The receiver's current view for the peer: ackno (once a SYN arrived),
    /// advertised window, and error state.
    pub fn ack(&self) -> Ack {
        let output = self.reassembler.output();

        let window_size = output.available_capacity().min(u64::from(u16::MAX)) as u16;

        let ackno = self.base_seqno.map(|base| {
            let ack_seq = output.bytes_pushed() + 1 + u64::from(output.is_closed());
            SeqNum::wrap(ack_seq, base)
        });

        Ack {
            ackno,
            window_size,
            rst: output.has_error(),
        }
    }

    pub fn bytes_pending(&self) -> u64 {
        self.reassembler.bytes_pending()
    }

    pub fn reader(&mut self) -> Reader<'_> {
        self.reassembler.reader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn segment(seqno: u32, payload: &'static [u8]) -> Segment {
        Segment {
            seqno: SeqNum::new(seqno),
            syn: false,
            payload: Bytes::from_static(payload),
            fin: false,
            rst: false,
        }
    }

    fn syn(seqno: u32) -> Segment {
        Segment {
            syn: true,
            ..segment(seqno, b"")
        }
    }

    fn read_all(receiver: &mut Receiver) -> Vec<u8> {
        let mut reader = receiver.reader();
        let mut out = Vec::new();
        while !reader.peek().is_empty() {
            let chunk = reader.peek().to_vec();
            reader.pop(chunk.len() as u64);
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn no_ackno_before_syn() {
        let receiver = Receiver::new(16);

        assert_eq!(receiver.ack().ackno, None);
    }

    #[test]
    fn segments_before_syn_are_dropped() {
        let mut receiver = Receiver::new(16);

        receiver.receive(segment(5, b"hello"));

        assert_eq!(receiver.ack().ackno, None);
        assert_eq!(receiver.bytes_pending(), 0);
    }

    #[test]
    fn syn_establishes_the_sequence_base() {
        let mut receiver = Receiver::new(16);

        receiver.receive(syn(100));

        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(101)));

        receiver.receive(segment(101, b"ab"));

        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(103)));
        assert_eq!(read_all(&mut receiver), b"ab");
    }

    #[test]
    fn syn_with_payload_and_fin_finishes_in_one_segment() {
        let mut receiver = Receiver::new(16);

        receiver.receive(Segment {
            seqno: SeqNum::new(7),
            syn: true,
            payload: Bytes::from_static(b"hi"),
            fin: true,
            rst: false,
        });

        // SYN + 2 payload bytes + FIN.
        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(11)));
        assert_eq!(read_all(&mut receiver), b"hi");
        assert!(receiver.reader().is_finished());
    }

    #[test]
    fn out_of_order_segments_are_reassembled() {
        let mut receiver = Receiver::new(16);

        receiver.receive(syn(0));
        receiver.receive(segment(3, b"cd"));

        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(1)));
        assert_eq!(receiver.bytes_pending(), 2);

        receiver.receive(segment(1, b"ab"));

        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(5)));
        assert_eq!(read_all(&mut receiver), b"abcd");
    }

    #[test]
    fn window_is_clamped_to_u16_max() {
        let receiver = Receiver::new(1 << 20);

        assert_eq!(receiver.ack().window_size, u16::MAX);
    }

    #[test]
    fn window_shrinks_with_buffered_bytes() {
        let mut receiver = Receiver::new(10);

        receiver.receive(syn(0));
        receiver.receive(segment(1, b"abcd"));

        assert_eq!(receiver.ack().window_size, 6);
    }

    #[test]
    fn rst_sets_the_error_flag_and_stops_ingestion() {
        let mut receiver = Receiver::new(16);

        receiver.receive(syn(0));
        receiver.receive(Segment {
            rst: true,
            ..segment(1, b"")
        });

        assert!(receiver.ack().rst);

        receiver.receive(segment(1, b"ab"));

        assert_eq!(receiver.bytes_pending(), 0);
        assert_eq!(receiver.reader().bytes_buffered(), 0);
    }

    #[test]
    fn duplicate_data_does_not_advance_the_ack() {
        let mut receiver = Receiver::new(16);

        receiver.receive(syn(0));
        receiver.receive(segment(1, b"ab"));
        receiver.receive(segment(1, b"ab"));

        assert_eq!(receiver.ack().ackno, Some(SeqNum::new(3)));
        assert_eq!(receiver.reader().bytes_buffered(), 2);
    }

    #[test]
    fn non_syn_segment_at_the_syn_position_is_dropped() {
        let mut receiver = Receiver::new(16);

        receiver.receive(syn(0));
        receiver.receive(segment(0, b"xy"));

        assert_eq!(receiver.bytes_pending(), 0);
        assert_eq!(receiver.reader().bytes_buffered(), 0);
    }
}
