use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr,
};

use crate::Ipv4Datagram;
use crate::expiring_map::ExpiringMap;

/// How long a learned IPv4 → Ethernet mapping stays valid.
const ARP_CACHE_TTL: Duration = Duration::from_secs(30);

/// Duplicate ARP requests for the same target are suppressed for this long.
const ARP_REQUEST_INTERVAL: Duration = Duration::from_secs(5);

/// An Ethernet interface that resolves next-hop IPv4 addresses via ARP.
///
/// Datagrams whose next hop is not yet resolved are parked until the reply
/// arrives; at most one ARP request per target is in flight within any
/// suppression window. Outbound frames are buffered and drained with
/// [`NetworkInterface::poll_transmit`], inbound datagrams with
/// [`NetworkInterface::poll_datagram`].
pub struct NetworkInterface {
    name: String,
    mac: EthernetAddress,
    ip: Ipv4Addr,

    arp_cache: ExpiringMap<Ipv4Addr, EthernetAddress>,
    /// Datagrams awaiting ARP resolution, in submission order per next hop.
    pending_datagrams: HashMap<Ipv4Addr, Vec<Ipv4Datagram>>,
    /// Next hops with an ARP request currently in flight.
    pending_requests: ExpiringMap<Ipv4Addr, ()>,

    datagrams_received: VecDeque<Ipv4Datagram>,
    buffered_transmits: VecDeque<Vec<u8>>,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, mac: EthernetAddress, ip: Ipv4Addr) -> Self {
        let name = name.into();

        tracing::info!(%name, %mac, %ip, "Creating network interface");

        Self {
            name,
            mac,
            ip,
            arp_cache: ExpiringMap::default(),
            pending_datagrams: HashMap::default(),
            pending_requests: ExpiringMap::default(),
            datagrams_received: VecDeque::default(),
            buffered_transmits: VecDeque::default(),
        }
    }

    /// Sends `datagram` towards `next_hop`, resolving its Ethernet address first
    /// if necessary.
    pub fn send_datagram(&mut self, datagram: Ipv4Datagram, next_hop: Ipv4Addr, now: Instant) {
        if let Some(mac) = self.arp_cache.get(&next_hop).copied() {
            self.transmit_datagram(&datagram, mac);
            return;
        }

        self.pending_datagrams
            .entry(next_hop)
            .or_default()
            .push(datagram);

        if self.pending_requests.contains_key(&next_hop) {
            return; // A request for this next hop is already in flight.
        }
        self.pending_requests
            .insert(next_hop, (), now + ARP_REQUEST_INTERVAL);

        tracing::debug!(interface = %self.name, ip = %next_hop, "Sending ARP request");

        self.transmit_arp(
            ArpRepr::EthernetIpv4 {
                operation: ArpOperation::Request,
                source_hardware_addr: self.mac,
                source_protocol_addr: self.ip,
                target_hardware_addr: EthernetAddress([0; 6]),
                target_protocol_addr: next_hop,
            },
            EthernetAddress::BROADCAST,
        );
    }

    /// Processes one inbound Ethernet frame.
    ///
    /// Frames not addressed to us (or broadcast) are ignored, as is anything
    /// that fails to parse.
    pub fn handle_frame(&mut self, frame: &[u8], now: Instant) {
        let Ok(frame) = EthernetFrame::new_checked(frame) else {
            tracing::trace!(interface = %self.name, "Dropping truncated Ethernet frame");
            return;
        };

        let dst = frame.dst_addr();
        if dst != self.mac && dst != EthernetAddress::BROADCAST {
            return;
        }

        match frame.ethertype() {
            EthernetProtocol::Ipv4 => match Ipv4Datagram::parse(frame.payload().to_vec()) {
                Ok(datagram) => self.datagrams_received.push_back(datagram),
                Err(e) => {
                    tracing::trace!(interface = %self.name, "Dropping IPv4 payload: {e:#}");
                }
            },
            EthernetProtocol::Arp => self.handle_arp(frame.payload(), now),
            EthernetProtocol::Ipv6 | EthernetProtocol::Unknown(_) => {}
        }
    }

    fn handle_arp(&mut self, payload: &[u8], now: Instant) {
        let Ok(packet) = ArpPacket::new_checked(payload) else {
            tracing::trace!(interface = %self.name, "Dropping truncated ARP packet");
            return;
        };
        let Ok(ArpRepr::EthernetIpv4 {
            operation,
            source_hardware_addr: sender_mac,
            source_protocol_addr: sender_ip,
            target_protocol_addr: target_ip,
            ..
        }) = ArpRepr::parse(&packet)
        else {
            tracing::trace!(interface = %self.name, "Dropping unsupported ARP packet");
            return;
        };

        // Any ARP message teaches us the sender's mapping.
        tracing::debug!(interface = %self.name, ip = %sender_ip, mac = %sender_mac, "Learned ARP mapping");
        self.arp_cache
            .insert(sender_ip, sender_mac, now + ARP_CACHE_TTL);

        if operation == ArpOperation::Request && target_ip == self.ip {
            self.transmit_arp(
                ArpRepr::EthernetIpv4 {
                    operation: ArpOperation::Reply,
                    source_hardware_addr: self.mac,
                    source_protocol_addr: self.ip,
                    target_hardware_addr: sender_mac,
                    target_protocol_addr: sender_ip,
                },
                sender_mac,
            );
        }

        if let Some(datagrams) = self.pending_datagrams.remove(&sender_ip) {
            for datagram in datagrams {
                self.transmit_datagram(&datagram, sender_mac);
            }
            self.pending_requests.remove(&sender_ip);
        }
    }

    /// Ages out ARP cache entries and request-suppression timers.
    pub fn handle_timeout(&mut self, now: Instant) {
        for ip in self.arp_cache.handle_timeout(now) {
            tracing::debug!(interface = %self.name, %ip, "ARP cache entry expired");
        }

        // Datagrams stay parked; the next send_datagram re-requests.
        self.pending_requests.handle_timeout(now);
    }

    /// Returns the next Ethernet frame that should be put on the wire.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.buffered_transmits.pop_front()
    }

    /// Returns the next received IPv4 datagram.
    pub fn poll_datagram(&mut self) -> Option<Ipv4Datagram> {
        self.datagrams_received.pop_front()
    }

    /// When [`NetworkInterface::handle_timeout`] next needs to run.
    pub fn poll_timeout(&self) -> Option<Instant> {
        earliest(
            self.arp_cache.poll_timeout(),
            self.pending_requests.poll_timeout(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    fn transmit_datagram(&mut self, datagram: &Ipv4Datagram, dst: EthernetAddress) {
        self.transmit(EthernetProtocol::Ipv4, dst, datagram.as_bytes());
    }

    fn transmit_arp(&mut self, repr: ArpRepr, dst: EthernetAddress) {
        let mut payload = vec![0u8; repr.buffer_len()];
        repr.emit(&mut ArpPacket::new_unchecked(&mut payload[..]));

        self.transmit(EthernetProtocol::Arp, dst, &payload);
    }

    fn transmit(&mut self, ethertype: EthernetProtocol, dst: EthernetAddress, payload: &[u8]) {
        let repr = EthernetRepr {
            src_addr: self.mac,
            dst_addr: dst,
            ethertype,
        };

        let mut buf = vec![0u8; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
        let mut frame = EthernetFrame::new_unchecked(&mut buf[..]);
        repr.emit(&mut frame);
        frame.payload_mut().copy_from_slice(payload);

        self.buffered_transmits.push_back(buf);
    }
}

fn earliest(left: Option<Instant>, right: Option<Instant>) -> Option<Instant> {
    match (left, right) {
        (Some(left), Some(right)) => Some(std::cmp::min(left, right)),
        (Some(deadline), None) | (None, Some(deadline)) => Some(deadline),
        (None, None) => None,
    }
}
