use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use crate::NetworkInterface;

/// Forwards IPv4 datagrams between interfaces by longest-prefix match.
pub struct Router {
    interfaces: Vec<NetworkInterface>,
    /// One table per prefix length; index 8 holds the /8 routes, keyed by the
    /// top 8 bits of the prefix. Longest-prefix match scans lengths downwards.
    routes: Vec<HashMap<u32, Route>>,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    interface: usize,
    /// `None` for directly attached networks: the datagram's own destination
    /// is the next hop.
    next_hop: Option<Ipv4Addr>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            interfaces: Vec::default(),
            routes: vec![HashMap::default(); 33],
        }
    }

    /// Adds an interface and returns its index for use in [`Router::add_route`].
    pub fn add_interface(&mut self, interface: NetworkInterface) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    pub fn interface(&self, index: usize) -> &NetworkInterface {
        &self.interfaces[index]
    }

    pub fn interface_mut(&mut self, index: usize) -> &mut NetworkInterface {
        &mut self.interfaces[index]
    }

    pub fn add_route(
        &mut self,
        prefix: Ipv4Addr,
        prefix_len: u8,
        next_hop: Option<Ipv4Addr>,
        interface: usize,
    ) {
        debug_assert!(prefix_len <= 32);

        tracing::info!(
            route = %format_args!("{prefix}/{prefix_len}"),
            ?next_hop,
            interface,
            "Adding route"
        );

        self.routes[usize::from(prefix_len)]
            .insert(prefix_key(u32::from(prefix), prefix_len), Route { interface, next_hop });
    }

    /// Drains every interface's received datagrams and forwards each one.
    ///
    /// Datagrams whose TTL would hit zero, or that match no route, are dropped.
    pub fn route(&mut self, now: Instant) {
        let mut inbound = Vec::new();
        for interface in &mut self.interfaces {
            while let Some(datagram) = interface.poll_datagram() {
                inbound.push(datagram);
            }
        }

        for mut datagram in inbound {
            if datagram.ttl() <= 1 {
                tracing::trace!(dst = %datagram.dst(), "Dropping datagram: TTL exceeded");
                continue;
            }
            datagram.decrement_ttl();

            let dst = datagram.dst();
            let Some(route) = self.lookup(dst) else {
                tracing::trace!(%dst, "Dropping datagram: no route");
                continue;
            };

            let next_hop = route.next_hop.unwrap_or(dst);
            self.interfaces[route.interface].send_datagram(datagram, next_hop, now);
        }
    }

    /// Ages every interface's ARP state.
    pub fn handle_timeout(&mut self, now: Instant) {
        for interface in &mut self.interfaces {
            interface.handle_timeout(now);
        }
    }

    fn lookup(&self, dst: Ipv4Addr) -> Option<Route> {
        let dst = u32::from(dst);

        (0..=32u8)
            .rev()
            .find_map(|len| self.routes[usize::from(len)].get(&prefix_key(dst, len)).copied())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// The top `len` bits of `addr`, shifted into the low positions.
fn prefix_key(addr: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        addr >> (32 - u32::from(len))
    }
}
