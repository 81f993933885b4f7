//! The state machines that make a reliable byte stream out of unreliable datagrams.
//!
//! Everything in here is sans-IO: inbound segments are handed in by the caller,
//! outbound segments are buffered and drained via `poll_transmit`, and time only
//! advances when the caller says so. The pieces compose bottom-up:
//!
//! - [`ByteStream`]: a bounded FIFO with a producer/consumer split.
//! - [`Reassembler`]: orders out-of-order substrings into a [`ByteStream`].
//! - [`SeqNum`]: 32-bit wrapping sequence numbers and their 64-bit unwrapping.
//! - [`Receiver`]: decodes inbound segments and feeds the reassembler.
//! - [`Sender`]: carves stream bytes into segments and retransmits with backoff.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod byte_stream;
mod reassembler;
mod receiver;
mod segment;
mod sender;
mod seqnum;

pub use byte_stream::{ByteStream, Reader, Writer};
pub use reassembler::Reassembler;
pub use receiver::Receiver;
pub use segment::{Ack, Segment};
pub use sender::{DEFAULT_RTO, MAX_PAYLOAD, Sender};
pub use seqnum::SeqNum;
