use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::{in_subnet, network_of, prefix_len};
use crate::topology::{Device, DeviceKind};

/// An operator-added route on a router or firewall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRoute {
    pub prefix: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    #[serde(default = "default_metric")]
    pub metric: u32,
}

fn default_metric() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOrigin {
    Connected,
    Static,
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// `None` for directly-connected destinations.
    pub next_hop: Option<Ipv4Addr>,
    pub interface: String,
    pub metric: u32,
    pub origin: RouteOrigin,
}

impl RouteEntry {
    pub fn matches(&self, destination: Ipv4Addr) -> bool {
        network_of(destination, self.mask) == self.destination
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    pub entries: Vec<RouteEntry>,
}

impl RoutingTable {
    /// Derives the table a device would hold right now: connected subnets
    /// first, then its default gateway (hosts) or its static routes (routers,
    /// firewalls). Static routes whose next hop is not on a connected subnet
    /// are left out.
    pub fn for_device(device: &Device) -> Self {
        let mut entries = Vec::new();

        for (iface, ip, mask) in device.addressed_interfaces() {
            entries.push(RouteEntry {
                destination: network_of(ip, mask),
                mask,
                next_hop: None,
                interface: iface.name.clone(),
                metric: 0,
                origin: RouteOrigin::Connected,
            });
        }

        if device.kind == DeviceKind::Host {
            for iface in &device.interfaces {
                if let (Some(gateway), Some(_)) = (iface.gateway, iface.address()) {
                    entries.push(RouteEntry {
                        destination: Ipv4Addr::UNSPECIFIED,
                        mask: Ipv4Addr::UNSPECIFIED,
                        next_hop: Some(gateway),
                        interface: iface.name.clone(),
                        metric: 0,
                        origin: RouteOrigin::Gateway,
                    });
                }
            }
        }

        if device.kind.is_routed() {
            for route in &device.routes {
                let egress = device
                    .addressed_interfaces()
                    .find(|(_, ip, mask)| in_subnet(*ip, route.next_hop, *mask));
                if let Some((iface, _, _)) = egress {
                    entries.push(RouteEntry {
                        destination: network_of(route.prefix, route.mask),
                        mask: route.mask,
                        next_hop: Some(route.next_hop),
                        interface: iface.name.clone(),
                        metric: route.metric,
                        origin: RouteOrigin::Static,
                    });
                }
            }
        }

        Self { entries }
    }

    /// Longest-prefix match; lower metric breaks ties, then insertion order.
    pub fn lookup(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in self.entries.iter().filter(|e| e.matches(destination)) {
            let better = match best {
                None => true,
                Some(current) => {
                    let (len, current_len) = (prefix_len(entry.mask), prefix_len(current.mask));
                    len > current_len || (len == current_len && entry.metric < current.metric)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        best
    }
}
