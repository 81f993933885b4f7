use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::byte_stream::Writer;
use crate::{Ack, ByteStream, Segment, SeqNum};

/// Largest payload carried by a single segment.
pub const MAX_PAYLOAD: usize = 1000;

/// Initial retransmission timeout, before any backoff.
pub const DEFAULT_RTO: Duration = Duration::from_millis(1000);

/// The sending half of a connection.
///
/// Carves bytes from its input [`ByteStream`] into segments within the peer's
/// advertised window, keeps them queued until acknowledged, and retransmits the
/// oldest outstanding segment with exponential backoff when the timer expires.
///
/// Outbound segments are buffered; drain them with [`Sender::poll_transmit`].
#[derive(Debug)]
pub struct Sender {
    input: ByteStream,
    isn: SeqNum,
    initial_rto: Duration,

    /// Next absolute sequence number to send.
    next_seq: u64,
    /// Highest absolute sequence number fully acknowledged.
    acked_seq: u64,
    /// The peer's last advertised window. Starts at 1 to allow the SYN out.
    window: u16,
    /// Sum of the sequence lengths of everything outstanding.
    in_flight: u64,
    consecutive_retransmissions: u64,
    syn_sent: bool,
    fin_sent: bool,

    outstanding: VecDeque<Segment>,
    buffered_transmits: VecDeque<Segment>,
    timer: RetransmitTimer,
}

impl Sender {
    pub fn new(capacity: u64, isn: SeqNum, initial_rto: Duration) -> Self {
        Self {
            input: ByteStream::new(capacity),
            isn,
            initial_rto,
            next_seq: 0,
            acked_seq: 0,
            window: 1,
            in_flight: 0,
            consecutive_retransmissions: 0,
            syn_sent: false,
            fin_sent: false,
            outstanding: VecDeque::default(),
            buffered_transmits: VecDeque::default(),
            timer: RetransmitTimer::new(initial_rto),
        }
    }

    /// The application-facing side of the outbound stream.
    pub fn writer(&mut self) -> Writer<'_> {
        self.input.writer()
    }

    /// Fills the peer's window with new segments from the input stream.
    ///
    /// A zero window is treated as one so a single byte (or flag) still goes
    /// out, forcing the peer to re-advertise once space frees up.
    pub fn push(&mut self, now: Instant) {
        loop {
            let window = u64::from(self.window.max(1));

            if self.fin_sent || window <= self.in_flight {
                break;
            }

            let mut segment = self.empty_segment();
            if !self.syn_sent {
                segment.syn = true;
                self.syn_sent = true;
            }

            let remaining = window - self.in_flight;
            let budget = (remaining - segment.sequence_length()).min(MAX_PAYLOAD as u64) as usize;

            let mut payload = BytesMut::new();
            let mut reader = self.input.reader();
            while reader.bytes_buffered() != 0 && payload.len() < budget {
                let chunk = reader.peek();
                let take = chunk.len().min(budget - payload.len());
                payload.extend_from_slice(&chunk[..take]);
                reader.pop(take as u64);
            }
            segment.payload = payload.freeze();

            if !self.fin_sent
                && self.input.is_finished()
                && remaining > segment.sequence_length()
            {
                segment.fin = true;
                self.fin_sent = true;
            }

            if segment.sequence_length() == 0 {
                break;
            }

            self.timer.arm(now);
            self.next_seq += segment.sequence_length();
            self.in_flight += segment.sequence_length();
            self.outstanding.push_back(segment.clone());
            self.buffered_transmits.push_back(segment);
        }
    }

    /// A bare segment carrying only the current sequence number and error state.
    pub fn empty_segment(&self) -> Segment {
        Segment {
            seqno: SeqNum::wrap(self.next_seq, self.isn),
            syn: false,
            payload: Bytes::new(),
            fin: false,
            rst: self.input.has_error(),
        }
    }

    /// Processes the peer receiver's window and acknowledgment.
    pub fn receive(&mut self, ack: Ack, now: Instant) {
        if self.input.has_error() || ack.rst {
            if ack.rst {
                self.input.set_error();
            }
            return;
        }

        self.window = ack.window_size;

        let Some(ackno) = ack.ackno else {
            return;
        };

        let received_ack = ackno.unwrap(self.isn, self.next_seq);
        if received_ack > self.next_seq {
            tracing::trace!(received_ack, next_seq = self.next_seq, "Dropping ack beyond sent data");
            return;
        }

        let mut acked = false;
        while let Some(head) = self.outstanding.front() {
            let length = head.sequence_length();

            // Partial acks leave the segment outstanding.
            if self.acked_seq + length > received_ack {
                break;
            }

            self.acked_seq += length;
            self.in_flight -= length;
            self.outstanding.pop_front();
            acked = true;
        }

        if acked {
            self.consecutive_retransmissions = 0;
            self.timer.reset(self.initial_rto, now);
            if self.outstanding.is_empty() {
                self.timer.disarm();
            }
        }
    }

    /// Retransmits the oldest outstanding segment if the timer has expired.
    ///
    /// Backoff (doubled RTO, bumped retransmission count) only applies when the
    /// peer's window was nonzero; zero-window probes repeat at the same pace.
    pub fn handle_timeout(&mut self, now: Instant) {
        if !self.timer.is_expired(now) {
            return;
        }

        let Some(head) = self.outstanding.front() else {
            return;
        };

        tracing::debug!(seqno = %head.seqno, "Retransmitting");
        self.buffered_transmits.push_back(head.clone());

        if self.window != 0 {
            self.consecutive_retransmissions += 1;
            self.timer.back_off();
        }

        self.timer.rearm(now);
    }

    /// Returns the next segment that should be put on the wire.
    pub fn poll_transmit(&mut self) -> Option<Segment> {
        self.buffered_transmits.pop_front()
    }

    /// When [`Sender::handle_timeout`] next needs to run.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timer.expires_at
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.in_flight
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }
}

/// Deadline-based retransmission timer. Armed iff a deadline is set.
#[derive(Debug)]
struct RetransmitTimer {
    rto: Duration,
    expires_at: Option<Instant>,
}

impl RetransmitTimer {
    fn new(rto: Duration) -> Self {
        Self {
            rto,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Starts the countdown unless it is already running.
    fn arm(&mut self, now: Instant) {
        if self.expires_at.is_none() {
            self.expires_at = Some(now + self.rto);
        }
    }

    fn disarm(&mut self) {
        self.expires_at = None;
    }

    /// Restores the initial timeout and restarts the countdown.
    fn reset(&mut self, initial_rto: Duration, now: Instant) {
        self.rto = initial_rto;
        self.expires_at = Some(now + initial_rto);
    }

    fn back_off(&mut self) {
        self.rto *= 2;
    }

    fn rearm(&mut self, now: Instant) {
        self.expires_at = Some(now + self.rto);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(capacity: u64) -> Sender {
        Sender::new(capacity, SeqNum::new(0), DEFAULT_RTO)
    }

    fn ack(ackno: u64, window_size: u16) -> Ack {
        Ack {
            ackno: Some(SeqNum::wrap(ackno, SeqNum::new(0))),
            window_size,
            rst: false,
        }
    }

    #[test]
    fn first_push_sends_a_syn() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.push(now);

        let segment = sender.poll_transmit().unwrap();
        assert!(segment.syn);
        assert_eq!(segment.seqno, SeqNum::new(0));
        assert_eq!(sender.sequence_numbers_in_flight(), 1);
        assert!(sender.poll_transmit().is_none());
    }

    #[test]
    fn repeated_pushes_do_not_resend() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.push(now);
        sender.poll_transmit().unwrap();

        sender.push(now);

        assert!(sender.poll_transmit().is_none());
    }

    #[test]
    fn data_flows_once_the_window_opens() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.writer().push(Bytes::from_static(b"hello"));
        sender.push(now);

        // Initial window of 1 only admits the SYN.
        assert!(sender.poll_transmit().unwrap().syn);
        assert!(sender.poll_transmit().is_none());

        sender.receive(ack(1, 10), now);
        sender.push(now);

        let segment = sender.poll_transmit().unwrap();
        assert_eq!(segment.payload.as_ref(), b"hello");
        assert_eq!(segment.seqno, SeqNum::new(1));
        assert_eq!(sender.sequence_numbers_in_flight(), 5);
    }

    #[test]
    fn fin_needs_window_space_of_its_own() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.writer().push(Bytes::from_static(b"ab"));
        sender.writer().close();

        sender.push(now);
        assert!(sender.poll_transmit().unwrap().syn);

        sender.receive(ack(1, 2), now);
        sender.push(now);

        // Window of 2 is exactly consumed by the payload; no room for FIN.
        let segment = sender.poll_transmit().unwrap();
        assert_eq!(segment.payload.as_ref(), b"ab");
        assert!(!segment.fin);

        sender.receive(ack(3, 2), now);
        sender.push(now);

        let segment = sender.poll_transmit().unwrap();
        assert!(segment.fin);
        assert_eq!(segment.sequence_length(), 1);
    }

    #[test]
    fn fin_rides_along_when_the_window_allows() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.writer().push(Bytes::from_static(b"ab"));
        sender.writer().close();

        sender.push(now);
        assert!(sender.poll_transmit().unwrap().syn);

        sender.receive(ack(1, 10), now);
        sender.push(now);

        let segment = sender.poll_transmit().unwrap();
        assert_eq!(segment.payload.as_ref(), b"ab");
        assert!(segment.fin);
        assert_eq!(sender.sequence_numbers_in_flight(), 3);
    }

    #[test]
    fn payload_is_split_at_max_payload() {
        let mut sender = sender(4096);
        let now = Instant::now();

        sender.writer().push(Bytes::from(vec![b'x'; MAX_PAYLOAD + 1]));
        sender.push(now);
        assert!(sender.poll_transmit().unwrap().syn);

        sender.receive(ack(1, u16::MAX), now);
        sender.push(now);

        let first = sender.poll_transmit().unwrap();
        let second = sender.poll_transmit().unwrap();
        assert_eq!(first.payload.len(), MAX_PAYLOAD);
        assert_eq!(second.payload.len(), 1);
    }

    #[test]
    fn zero_window_probe_sends_a_single_byte() {
        let mut sender = sender(16);
        let mut now = Instant::now();

        sender.writer().push(Bytes::from_static(b"x"));
        sender.push(now);
        sender.poll_transmit().unwrap();

        // Peer acks the SYN but advertises a closed window.
        sender.receive(ack(1, 0), now);
        sender.push(now);

        let probe = sender.poll_transmit().unwrap();
        assert_eq!(probe.payload.as_ref(), b"x");
        assert!(sender.poll_transmit().is_none());

        // The probe retransmits without counting or backing off.
        now += DEFAULT_RTO;
        sender.handle_timeout(now);

        let retransmit = sender.poll_transmit().unwrap();
        assert_eq!(retransmit.payload.as_ref(), b"x");
        assert_eq!(sender.consecutive_retransmissions(), 0);
        assert_eq!(sender.poll_timeout(), Some(now + DEFAULT_RTO));
    }

    #[test]
    fn retransmissions_back_off_exponentially_and_reset_on_ack() {
        let mut sender = sender(16);
        let mut now = Instant::now();

        sender.writer().push(Bytes::from_static(b"ab"));
        sender.push(now);
        sender.receive(ack(1, 1000), now);
        sender.push(now);
        while sender.poll_transmit().is_some() {}

        now += DEFAULT_RTO;
        sender.handle_timeout(now);
        assert!(sender.poll_transmit().is_some());
        assert_eq!(sender.consecutive_retransmissions(), 1);
        assert_eq!(sender.poll_timeout(), Some(now + 2 * DEFAULT_RTO));

        now += 2 * DEFAULT_RTO;
        sender.handle_timeout(now);
        assert!(sender.poll_transmit().is_some());
        assert_eq!(sender.consecutive_retransmissions(), 2);
        assert_eq!(sender.poll_timeout(), Some(now + 4 * DEFAULT_RTO));

        // Fresh ack restores the initial RTO and clears the counter.
        sender.receive(ack(3, 1000), now);
        assert_eq!(sender.consecutive_retransmissions(), 0);
        assert_eq!(sender.poll_timeout(), None);

        sender.writer().push(Bytes::from_static(b"cd"));
        sender.push(now);
        assert_eq!(sender.poll_timeout(), Some(now + DEFAULT_RTO));
    }

    #[test]
    fn timer_does_not_fire_early() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.push(now);
        sender.poll_transmit().unwrap();

        sender.handle_timeout(now + DEFAULT_RTO / 2);

        assert!(sender.poll_transmit().is_none());
    }

    #[test]
    fn partial_ack_keeps_the_segment_outstanding() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.writer().push(Bytes::from_static(b"abcd"));
        sender.push(now);
        sender.receive(ack(1, 10), now);
        sender.push(now);
        while sender.poll_transmit().is_some() {}

        assert_eq!(sender.sequence_numbers_in_flight(), 4);

        // Acks only half of the 4-byte segment.
        sender.receive(ack(3, 10), now);

        assert_eq!(sender.sequence_numbers_in_flight(), 4);
    }

    #[test]
    fn ack_beyond_sent_data_is_ignored() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.push(now);

        sender.receive(ack(10, 10), now);

        assert_eq!(sender.sequence_numbers_in_flight(), 1);
    }

    #[test]
    fn rst_poisons_the_input_stream() {
        let mut sender = sender(16);
        let now = Instant::now();

        sender.receive(
            Ack {
                ackno: None,
                window_size: 0,
                rst: true,
            },
            now,
        );

        assert!(sender.empty_segment().rst);
    }

    #[test]
    fn in_flight_never_exceeds_the_effective_window() {
        let mut sender = sender(64);
        let now = Instant::now();

        sender.writer().push(Bytes::from(vec![b'y'; 50]));
        sender.push(now);
        sender.receive(ack(1, 8), now);
        sender.push(now);

        assert!(sender.sequence_numbers_in_flight() <= 8);
    }
}
