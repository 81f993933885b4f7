use std::net::Ipv4Addr;

use anyhow::{Result, anyhow, ensure};
use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{IpProtocol, Ipv4Packet, Ipv4Repr};

/// An owned, header-validated IPv4 datagram.
///
/// The buffer is kept in wire format; accessors parse the header on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    buf: Vec<u8>,
}

impl Ipv4Datagram {
    /// Validates a serialized datagram and takes ownership of it.
    pub fn parse(buf: Vec<u8>) -> Result<Self> {
        let packet =
            Ipv4Packet::new_checked(buf.as_slice()).map_err(|e| anyhow!("Malformed IPv4 header: {e}"))?;
        ensure!(packet.verify_checksum(), "Invalid IPv4 header checksum");

        Ok(Self { buf })
    }

    /// Builds a fresh datagram; meant for drivers and tests.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8, payload: &[u8]) -> Self {
        let repr = Ipv4Repr {
            src_addr: src,
            dst_addr: dst,
            next_header: IpProtocol::Udp,
            payload_len: payload.len(),
            hop_limit: ttl,
        };

        let mut buf = vec![0u8; repr.buffer_len() + payload.len()];
        let mut packet = Ipv4Packet::new_unchecked(&mut buf[..]);
        repr.emit(&mut packet, &ChecksumCapabilities::default());
        packet.payload_mut().copy_from_slice(payload);

        Self { buf }
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Packet::new_unchecked(self.buf.as_slice()).src_addr()
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Packet::new_unchecked(self.buf.as_slice()).dst_addr()
    }

    pub fn ttl(&self) -> u8 {
        Ipv4Packet::new_unchecked(self.buf.as_slice()).hop_limit()
    }

    /// Decrements the TTL by one and refreshes the header checksum.
    ///
    /// Must not be called with a TTL of zero; routers drop those instead.
    pub fn decrement_ttl(&mut self) {
        let mut packet = Ipv4Packet::new_unchecked(&mut self.buf[..]);
        let ttl = packet.hop_limit();
        debug_assert!(ttl > 0);
        packet.set_hop_limit(ttl.saturating_sub(1));
        packet.fill_checksum();
    }

    pub fn payload(&self) -> &[u8] {
        Ipv4Packet::new_unchecked(self.buf.as_slice()).payload()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
