//! IPv4-over-Ethernet plumbing: ARP resolution and longest-prefix routing.
//!
//! Like the transport layer, everything here is sans-IO. A [`NetworkInterface`]
//! turns outbound datagrams into Ethernet frames (resolving next hops via ARP)
//! and inbound frames into datagrams; a [`Router`] moves datagrams between
//! interfaces by longest-prefix match. Callers feed frames in, drain frames
//! out, and drive time explicitly.
//!
//! Wire formats are handled by [`smoltcp::wire`]; this crate only implements
//! the state machines on top.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod datagram;
mod expiring_map;
mod interface;
mod router;

pub use datagram::Ipv4Datagram;
pub use interface::NetworkInterface;
pub use router::Router;

pub use smoltcp::wire::EthernetAddress;
